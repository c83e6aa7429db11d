//! Integration tests for module imports, using an in-memory fetcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use warden_context::PermissionKind::{Create, Read, Update, Use};
use warden_context::{Context, Permission, Url};
use warden_eval::{sha256_hex, Error, EvalError, FetchError, ModuleFetcher, Runtime, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const LIB_URL: &str = "https://example.com/lib.wd";

const LIB: &str = r#"
return {
    base: $$base
    doubled: ($$base * 2)
}
"#;

struct MapFetcher {
    modules: HashMap<String, String>,
    fetches: Arc<AtomicUsize>,
}

impl ModuleFetcher for MapFetcher {
    fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.modules
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Request(format!("{url}: 404")))
    }
}

fn runtime_with(modules: &[(&str, &str)]) -> (Runtime, Arc<AtomicUsize>) {
    let fetches = Arc::new(AtomicUsize::new(0));
    let fetcher = MapFetcher {
        modules: modules
            .iter()
            .map(|(url, text)| (url.to_string(), text.to_string()))
            .collect(),
        fetches: Arc::clone(&fetches),
    };
    (Runtime::new().with_fetcher(fetcher), fetches)
}

fn context() -> Context {
    Context::new(
        vec![
            Permission::global(Read, "*"),
            Permission::global(Update, "*"),
            Permission::global(Create, "*"),
            Permission::global(Use, "*"),
            Permission::url(Read, Url::new(LIB_URL).unwrap()),
        ],
        vec![],
    )
}

fn import_source(checksum: &str) -> String {
    format!(
        r#"
import lib {LIB_URL} "{checksum}" {{base: 21}}
return $$lib.doubled
"#
    )
}

fn eval_root(err: &Error) -> &EvalError {
    match err {
        Error::Evaluation(e) => e.root(),
        other => panic!("expected an evaluation error, got {other}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Imports
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_import_binds_module_result() {
    let (runtime, fetches) = runtime_with(&[(LIB_URL, LIB)]);
    let value = runtime
        .run_str("main.wd", &import_source(&sha256_hex(LIB)), context())
        .unwrap();
    assert_eq!(value, Value::Int(42));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn test_checksum_is_case_insensitive() {
    let (runtime, _) = runtime_with(&[(LIB_URL, LIB)]);
    let checksum = sha256_hex(LIB).to_ascii_uppercase();
    assert_eq!(
        runtime.run_str("main.wd", &import_source(&checksum), context()).unwrap(),
        Value::Int(42)
    );
}

#[test]
fn test_repeated_import_uses_cache() {
    let (runtime, fetches) = runtime_with(&[(LIB_URL, LIB)]);
    let checksum = sha256_hex(LIB);
    let source = format!(
        r#"
import a {LIB_URL} "{checksum}" {{base: 1}}
import b {LIB_URL} "{checksum}" {{base: 2}}
return [$$a.doubled, $$b.doubled]
"#
    );
    let value = runtime.run_str("main.wd", &source, context()).unwrap();
    assert_eq!(value, Value::List(vec![Value::Int(2), Value::Int(4)]));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn test_checksum_mismatch_is_rejected() {
    let (runtime, _) = runtime_with(&[(LIB_URL, LIB)]);
    let err = runtime
        .run_str("main.wd", &import_source(&sha256_hex("something else")), context())
        .unwrap_err();
    assert!(matches!(eval_root(&err), EvalError::Import { url, .. } if url == LIB_URL));
}

#[test]
fn test_fetch_failure_is_an_import_error() {
    let (runtime, _) = runtime_with(&[]);
    let err = runtime
        .run_str("main.wd", &import_source(&sha256_hex(LIB)), context())
        .unwrap_err();
    assert!(matches!(eval_root(&err), EvalError::Import { .. }));
}

#[test]
fn test_import_needs_read_on_url() {
    let (runtime, fetches) = runtime_with(&[(LIB_URL, LIB)]);
    let context = Context::new(vec![Permission::global(Read, "*")], vec![]);
    let err = runtime
        .run_str("main.wd", &import_source(&sha256_hex(LIB)), context)
        .unwrap_err();
    assert_eq!(
        err.not_allowed().map(|e| e.permission.clone()),
        Some(Permission::url(Read, Url::new(LIB_URL).unwrap()))
    );
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[test]
fn test_imported_module_cannot_read_other_globals() {
    let lib = "return $$secret";
    let (runtime, _) = runtime_with(&[(LIB_URL, lib)]);
    let source = format!(
        r#"
$$secret = "hunter2"
import lib {LIB_URL} "{}" {{}}
return $$lib
"#,
        sha256_hex(lib)
    );
    let err = runtime.run_str("main.wd", &source, context()).unwrap_err();
    assert_eq!(
        err.not_allowed().map(|e| e.permission.clone()),
        Some(Permission::global(Read, "secret"))
    );
}

#[test]
fn test_imported_module_with_check_errors() {
    let lib = "break";
    let (runtime, _) = runtime_with(&[(LIB_URL, lib)]);
    let err = runtime
        .run_str("main.wd", &import_source(&sha256_hex(lib)), context())
        .unwrap_err();
    assert!(matches!(eval_root(&err), EvalError::Import { .. }));
}
