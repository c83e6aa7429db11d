//! Optional host functions. All of them take the context, so calling them
//! only needs `use` on their name; the entities they touch are checked
//! through their signatures.

use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::info;
use warden_context::PermissionKind;

use crate::native::{EntityAccess, NativeFunction, ParamKind, Signature};
use crate::runtime::Runtime;
use crate::value::Value;

/// Limiter consumed by `read_file`, in bytes.
pub const FS_READ_LIMIT: &str = "fs/read";
/// Limiter consumed by `http_get`, in bytes.
pub const HTTP_READ_LIMIT: &str = "http/read";

pub(crate) fn register(runtime: &mut Runtime) {
    let timeout = runtime.config().http_timeout();
    runtime.define_native(read_file());
    runtime.define_native(http_get(timeout));
    runtime.define_native(exec());
    runtime.define_native(sleep());
    runtime.define_native(log());
}

/// `[content, nil]` or `[nil, error]`.
fn outcome(result: Result<String, String>) -> Value {
    match result {
        Ok(content) => Value::List(vec![Value::Str(content), Value::Nil]),
        Err(message) => Value::List(vec![Value::Nil, Value::Error(message)]),
    }
}

fn read_file() -> NativeFunction {
    let signature = Signature::new(vec![ParamKind::Path])
        .results(2)
        .takes_context()
        .accesses(EntityAccess::Filesystem {
            kind: PermissionKind::Read,
            param: 0,
        });
    NativeFunction::new("read_file", signature, |call, args| {
        let Some(Value::Path(path)) = args.first() else {
            return Err("expected a path".into());
        };
        let path = path.to_absolute().map_err(|e| e.to_string())?;
        let result = std::fs::read_to_string(path.as_str()).map_err(|e| e.to_string());
        if let (Ok(content), Some(context)) = (&result, call.context()) {
            context.take(FS_READ_LIMIT, content.len() as u64);
        }
        Ok(outcome(result))
    })
}

fn http_get(timeout: Duration) -> NativeFunction {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let signature = Signature::new(vec![ParamKind::Url])
        .results(2)
        .takes_context()
        .accesses(EntityAccess::Http {
            kind: PermissionKind::Read,
            param: 0,
        });
    NativeFunction::new("http_get", signature, move |call, args| {
        let Some(Value::Url(url)) = args.first() else {
            return Err("expected a url".into());
        };
        let result = agent
            .get(url.as_str())
            .call()
            .map_err(|e| e.to_string())
            .and_then(|response| response.into_string().map_err(|e| e.to_string()));
        if let (Ok(body), Some(context)) = (&result, call.context()) {
            context.take(HTTP_READ_LIMIT, body.len() as u64);
        }
        Ok(outcome(result))
    })
}

fn exec() -> NativeFunction {
    let signature = Signature::new(vec![ParamKind::Str])
        .variadic(ParamKind::Str)
        .results(2)
        .takes_context()
        .accesses(EntityAccess::Command { param: 0 });
    NativeFunction::new("exec", signature, |_, args| {
        let mut words = args.iter().filter_map(Value::as_str);
        let Some(program) = words.next() else {
            return Err("expected a command name".into());
        };
        let result = match Command::new(program).args(words).output() {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => Err(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => Err(format!("cannot run {program}: {e}")),
        };
        Ok(outcome(result))
    })
}

fn sleep() -> NativeFunction {
    let signature = Signature::new(vec![ParamKind::Duration])
        .results(0)
        .takes_context();
    NativeFunction::new("sleep", signature, |_, args| {
        if let Some(Value::Duration(duration)) = args.first() {
            thread::sleep(*duration);
        }
        Ok(Value::Nil)
    })
}

fn log() -> NativeFunction {
    let signature = Signature::new(vec![])
        .variadic(ParamKind::Any)
        .results(0)
        .takes_context();
    NativeFunction::new("log", signature, |_, args| {
        let message = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "warden::script", "{message}");
        Ok(Value::Nil)
    })
}
