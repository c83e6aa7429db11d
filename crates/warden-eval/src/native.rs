//! Host functions.
//!
//! A [`NativeFunction`] declares a [`Signature`]: parameter kinds for
//! argument marshalling, the number of results, whether it receives the
//! calling routine's [`Context`], and which arguments name entities it
//! touches. The evaluator derives the permissions to check from that
//! declaration before the function body runs.
//!
//! A function that does not take the context is "contextless" and can only
//! be called with `use: { contextless: [...] }`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;
use warden_context::{Context, Permission, PermissionKind, MAX_SUBCOMMANDS};

use crate::error::{mismatch, panic_message, EvalError, EvalResult};
use crate::value::{Object, Record, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Signatures
// ══════════════════════════════════════════════════════════════════════════════

/// Expected kind of a native argument.
#[derive(Debug, Clone)]
pub enum ParamKind {
    Any,
    Bool,
    Int,
    Float,
    Str,
    Duration,
    Path,
    Url,
    Host,
    List,
    Object,
    /// A host struct; object literals with exactly its fields are converted.
    Struct(Arc<StructShape>),
}

impl ParamKind {
    pub fn name(&self) -> &str {
        match self {
            ParamKind::Any => "any value",
            ParamKind::Bool => "a bool",
            ParamKind::Int => "an int",
            ParamKind::Float => "a float",
            ParamKind::Str => "a string",
            ParamKind::Duration => "a duration",
            ParamKind::Path => "a path",
            ParamKind::Url => "a url",
            ParamKind::Host => "a host",
            ParamKind::List => "a list",
            ParamKind::Object => "an object",
            ParamKind::Struct(shape) => &shape.name,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ParamKind::Any, _)
                | (ParamKind::Bool, Value::Bool(_))
                | (ParamKind::Int, Value::Int(_))
                | (ParamKind::Float, Value::Float(_))
                | (ParamKind::Str, Value::Str(_))
                | (ParamKind::Duration, Value::Duration(_))
                | (ParamKind::Path, Value::Path(_))
                | (ParamKind::Url, Value::Url(_))
                | (ParamKind::Host, Value::Host(_))
                | (ParamKind::List, Value::List(_))
                | (ParamKind::Object, Value::Object(_))
        ) || matches!(
            (self, value),
            (ParamKind::Struct(shape), Value::Record(r)) if r.type_name == shape.name
        )
    }

    pub(crate) fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (ParamKind::Struct(shape), Value::Object(object)) => {
                shape.build(object).map(Value::Record)
            }
            (kind, value) if kind.accepts(&value) => Ok(value),
            (kind, value) => Err(format!("expected {}, found {}", kind.name(), value.type_name())),
        }
    }
}

/// Field layout of a host struct type.
#[derive(Debug, Clone)]
pub struct StructShape {
    pub name: String,
    pub fields: Vec<(String, ParamKind)>,
}

impl StructShape {
    pub fn new(name: impl Into<String>, fields: Vec<(&str, ParamKind)>) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(field, kind)| (field.to_string(), kind))
                .collect(),
        }
    }

    fn build(&self, mut object: Object) -> Result<Record, String> {
        let mut fields = Object::new();
        for (field, kind) in &self.fields {
            let value = object
                .remove(field)
                .ok_or_else(|| format!("missing field '{field}' for {}", self.name))?;
            let value = kind
                .coerce(value)
                .map_err(|e| format!("field '{field}' of {}: {e}", self.name))?;
            fields.insert(field.clone(), value);
        }
        if let Some(extra) = object.keys().next() {
            return Err(format!("unexpected field '{extra}' for {}", self.name));
        }
        Ok(Record {
            type_name: self.name.clone(),
            fields,
        })
    }
}

/// An argument that names an entity the function accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityAccess {
    /// A path or path pattern argument.
    Filesystem { kind: PermissionKind, param: usize },
    /// A URL or host argument.
    Http { kind: PermissionKind, param: usize },
    /// A command name followed by its arguments; the leading string
    /// arguments are matched as subcommands.
    Command { param: usize },
}

impl EntityAccess {
    fn permission(&self, function: &str, args: &[Value]) -> EvalResult<Permission> {
        let missing = |param: usize| {
            EvalError::TypeMismatch(format!("{function} has no argument {}", param + 1))
        };
        match *self {
            EntityAccess::Filesystem { kind, param } => match args.get(param) {
                Some(Value::Path(path)) => Ok(Permission::path(kind, path.to_absolute()?)),
                Some(Value::PathPattern(pattern)) => {
                    Ok(Permission::path_pattern(kind, pattern.clone()))
                }
                Some(other) => Err(mismatch("a path", other)),
                None => Err(missing(param)),
            },
            EntityAccess::Http { kind, param } => match args.get(param) {
                Some(Value::Url(url)) => Ok(Permission::url(kind, url.clone())),
                Some(Value::Host(host)) => Ok(Permission::host(kind, host.clone())),
                Some(other) => Err(mismatch("a url or a host", other)),
                None => Err(missing(param)),
            },
            EntityAccess::Command { param } => match args.get(param) {
                Some(Value::Str(command)) => {
                    let subcommands = args
                        .iter()
                        .skip(param + 1)
                        .take(MAX_SUBCOMMANDS)
                        .map_while(|arg| arg.as_str().map(str::to_string))
                        .collect();
                    Ok(Permission::command(command.clone(), subcommands))
                }
                Some(other) => Err(mismatch("a command name", other)),
                None => Err(missing(param)),
            },
        }
    }
}

/// Declared interface of a native function.
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<ParamKind>,
    pub variadic: Option<ParamKind>,
    /// Number of results. With more than one the function returns a list,
    /// the last element of which is `nil` or an error.
    pub results: usize,
    pub takes_context: bool,
    pub entities: Vec<EntityAccess>,
}

impl Signature {
    pub fn new(params: Vec<ParamKind>) -> Self {
        Self {
            params,
            variadic: None,
            results: 1,
            takes_context: false,
            entities: Vec::new(),
        }
    }

    pub fn variadic(mut self, kind: ParamKind) -> Self {
        self.variadic = Some(kind);
        self
    }

    pub fn results(mut self, results: usize) -> Self {
        self.results = results;
        self
    }

    pub fn takes_context(mut self) -> Self {
        self.takes_context = true;
        self
    }

    pub fn accesses(mut self, entity: EntityAccess) -> Self {
        self.entities.push(entity);
        self
    }

    fn arity(&self) -> String {
        match self.variadic {
            Some(_) => format!("at least {}", self.params.len()),
            None => self.params.len().to_string(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Native functions
// ══════════════════════════════════════════════════════════════════════════════

pub type NativeResult = Result<Value, String>;

type NativeFn = dyn Fn(&NativeCall<'_>, Vec<Value>) -> NativeResult + Send + Sync;

/// What a native function sees of its caller.
pub struct NativeCall<'a> {
    name: &'a str,
    context: Option<&'a Context>,
}

impl NativeCall<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    /// The calling routine's context; `None` for contextless functions.
    pub fn context(&self) -> Option<&Context> {
        self.context
    }
}

/// A host function callable from scripts.
pub struct NativeFunction {
    name: String,
    signature: Signature,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(&NativeCall<'_>, Vec<Value>) -> NativeResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The permission needed to call this function, `None` when it takes
    /// the context. `receiver` is the record type for methods.
    pub(crate) fn permission(&self, receiver: Option<&str>) -> Option<Permission> {
        if self.signature.takes_context {
            None
        } else {
            Some(Permission::contextless(receiver, self.name.clone()))
        }
    }

    /// Check the argument count and convert every argument to its declared
    /// kind.
    pub(crate) fn marshal(&self, args: Vec<Value>) -> EvalResult<Vec<Value>> {
        let sig = &self.signature;
        let fixed = sig.params.len();
        if args.len() < fixed || (sig.variadic.is_none() && args.len() > fixed) {
            return Err(EvalError::Arity {
                name: self.name.clone(),
                expected: sig.arity(),
                found: args.len(),
            });
        }
        args.into_iter()
            .enumerate()
            .map(|(i, arg)| match sig.params.get(i).or(sig.variadic.as_ref()) {
                Some(kind) => kind.coerce(arg).map_err(|message| {
                    EvalError::TypeMismatch(format!(
                        "argument {} of {}: {message}",
                        i + 1,
                        self.name
                    ))
                }),
                None => Ok(arg),
            })
            .collect()
    }

    /// Permissions required by the entity arguments of a marshalled call.
    pub(crate) fn entity_permissions(&self, args: &[Value]) -> EvalResult<Vec<Permission>> {
        self.signature
            .entities
            .iter()
            .map(|access| access.permission(&self.name, args))
            .collect()
    }

    /// Run the function. Panics are caught and reported as errors.
    pub(crate) fn invoke(&self, context: &Context, args: Vec<Value>) -> EvalResult<Value> {
        let call = NativeCall {
            name: &self.name,
            context: self.signature.takes_context.then_some(context),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| (self.func)(&call, args))) {
            Ok(Ok(value)) if self.signature.results == 0 => {
                drop(value);
                Ok(Value::Nil)
            }
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(EvalError::Native {
                name: self.name.clone(),
                message,
            }),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(native = %self.name, %message, "native function panicked");
                Err(EvalError::NativePanic {
                    name: self.name.clone(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Unpack the result of a `must` call: abort on a trailing error, otherwise
/// drop the error slot.
pub(crate) fn unwrap_must(name: &str, results: usize, value: Value) -> EvalResult<Value> {
    let failed = |message: String| EvalError::MustFailed {
        name: name.to_string(),
        message,
    };
    if results <= 1 {
        return match value {
            Value::Error(message) => Err(failed(message)),
            other => Ok(other),
        };
    }
    let Value::List(mut items) = value else {
        return Err(EvalError::TypeMismatch(format!(
            "{name} should return {results} results"
        )));
    };
    if let Some(Value::Error(message)) = items.pop() {
        return Err(failed(message));
    }
    if items.len() == 1 {
        Ok(items.swap_remove(0))
    } else {
        Ok(Value::List(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_context::Path;

    fn echo(signature: Signature) -> NativeFunction {
        NativeFunction::new("echo", signature, |_, mut args| Ok(args.pop().unwrap_or(Value::Nil)))
    }

    #[test]
    fn arity_is_checked() {
        let f = echo(Signature::new(vec![ParamKind::Int]));
        assert!(matches!(f.marshal(vec![]), Err(EvalError::Arity { found: 0, .. })));
        assert!(f.marshal(vec![Value::Int(1), Value::Int(2)]).is_err());

        let f = echo(Signature::new(vec![ParamKind::Str]).variadic(ParamKind::Int));
        assert!(f.marshal(vec![Value::str("a"), Value::Int(1), Value::Int(2)]).is_ok());
        assert!(f.marshal(vec![Value::str("a"), Value::str("b")]).is_err());
    }

    #[test]
    fn objects_become_records() {
        let shape = Arc::new(StructShape::new("User", vec![("Name", ParamKind::Str)]));
        let f = echo(Signature::new(vec![ParamKind::Struct(shape)]));

        let args = f.marshal(vec![Value::object([("Name", Value::str("Bar"))])]).unwrap();
        assert_eq!(args, vec![Value::record("User", [("Name", Value::str("Bar"))])]);

        assert!(f.marshal(vec![Value::object([("Name", Value::Int(1))])]).is_err());
        assert!(f
            .marshal(vec![Value::object([("Name", Value::str("a")), ("Age", Value::Int(1))])])
            .is_err());
    }

    #[test]
    fn command_subcommands_from_arguments() {
        let f = echo(
            Signature::new(vec![ParamKind::Str])
                .variadic(ParamKind::Str)
                .accesses(EntityAccess::Command { param: 0 }),
        );
        let args = vec![
            Value::str("git"),
            Value::str("remote"),
            Value::str("add"),
            Value::str("origin"),
        ];
        assert_eq!(
            f.entity_permissions(&args).unwrap(),
            vec![Permission::command("git", vec!["remote".into(), "add".into()])]
        );
    }

    #[test]
    fn filesystem_entity_from_path() {
        let f = echo(
            Signature::new(vec![ParamKind::Path])
                .accesses(EntityAccess::Filesystem { kind: PermissionKind::Read, param: 0 }),
        );
        let args = vec![Value::Path(Path::new("/data/a.txt").unwrap())];
        assert_eq!(
            f.entity_permissions(&args).unwrap(),
            vec![Permission::path(PermissionKind::Read, Path::new("/data/a.txt").unwrap())]
        );
    }

    #[test]
    fn panics_are_caught() {
        let f = NativeFunction::new("boom", Signature::new(vec![]), |_, _| panic!("kaboom"));
        let err = f.invoke(&Context::default(), vec![]).unwrap_err();
        assert!(matches!(err, EvalError::NativePanic { ref message, .. } if message == "kaboom"));
    }

    #[test]
    fn contextless_permission() {
        let f = echo(Signature::new(vec![]));
        assert_eq!(f.permission(None), Some(Permission::contextless(None, "echo")));
        assert_eq!(
            f.permission(Some("User")),
            Some(Permission::contextless(Some("User"), "echo"))
        );
        let f = echo(Signature::new(vec![]).takes_context());
        assert_eq!(f.permission(None), None);
    }

    #[test]
    fn must_unwrapping() {
        let ok = Value::List(vec![Value::str("data"), Value::Nil]);
        assert_eq!(unwrap_must("f", 2, ok).unwrap(), Value::str("data"));

        let failed = Value::List(vec![Value::Nil, Value::Error("no such file".into())]);
        assert!(matches!(
            unwrap_must("f", 2, failed),
            Err(EvalError::MustFailed { ref message, .. }) if message == "no such file"
        ));

        let three = Value::List(vec![Value::Int(1), Value::Int(2), Value::Nil]);
        assert_eq!(
            unwrap_must("f", 3, three).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(unwrap_must("f", 1, Value::Int(4)).unwrap(), Value::Int(4));
    }
}
