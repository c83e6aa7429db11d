//! Requirements conversion and context derivation, driven by parsed
//! `require` blocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use warden_context::*;
use warden_parser::parse_module;
use warden_types::SourceFile;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn requirements(source: &str) -> Result<Requirements, RequirementsError> {
    let sf = SourceFile::new("test.wd", source);
    let module = match parse_module(&sf) {
        Ok(module) => module,
        Err(e) => panic!("unexpected parsing error: {e}"),
    };
    let Some(require) = module.requirements else {
        panic!("no require block in {source:?}");
    };
    permissions_from_object(&require.object)
}

fn requirements_ok(source: &str) -> Requirements {
    match requirements(source) {
        Ok(r) => r,
        Err(e) => panic!("unexpected requirements error: {e}"),
    }
}

fn requirements_err(source: &str) -> RequirementsErrorKind {
    match requirements(source) {
        Ok(r) => panic!("expected a requirements error, got {r:?}"),
        Err(e) => e.reason,
    }
}

fn context(source: &str) -> Context {
    requirements_ok(source).into_context().unwrap()
}

fn path(p: &str) -> Path {
    Path::new(p).unwrap()
}

fn url(u: &str) -> Url {
    Url::new(u).unwrap()
}

use PermissionKind::*;

// ─────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_globals_wildcard() {
    let r = requirements_ok(r#"require { use: { globals: "*" } }"#);
    assert_eq!(r.permissions, vec![Permission::global(Use, "*")]);
    assert!(r.limits.is_empty());
    assert_eq!(r.stack, None);
}

#[test]
fn test_globals_list() {
    let r = requirements_ok(r#"require { read: { globals: ["a", "b"] } }"#);
    assert_eq!(
        r.permissions,
        vec![Permission::global(Read, "a"), Permission::global(Read, "b")]
    );
}

#[test]
fn test_entities_under_kind() {
    let r = requirements_ok(
        r#"require {
            read: {
                /data/...
                https://example.com/index.html
                globals: "*"
            }
            update: /tmp/out.txt
        }"#,
    );
    assert_eq!(r.permissions.len(), 4);
    assert_eq!(
        r.permissions[0],
        Permission::path_pattern(Read, PathPattern::new("/data/...").unwrap())
    );
    assert_eq!(
        r.permissions[1],
        Permission::url(Read, url("https://example.com/index.html"))
    );
    assert_eq!(r.permissions[2], Permission::global(Read, "*"));
    assert_eq!(r.permissions[3], Permission::path(Update, path("/tmp/out.txt")));
}

#[test]
fn test_entity_list() {
    let r = requirements_ok(r#"require { read: [/a, https://example.com] }"#);
    assert_eq!(
        r.permissions,
        vec![
            Permission::path(Read, path("/a")),
            Permission::host(Read, Host::new("https://example.com").unwrap()),
        ]
    );
}

#[test]
fn test_routines_and_commands() {
    let r = requirements_ok(
        r#"require {
            create: { routines: {} }
            use: { commands: { ls: {}, git: { push: {}, remote: { add: {} } } } }
        }"#,
    );
    assert_eq!(
        r.permissions,
        vec![
            Permission::Routine,
            Permission::command("ls", vec![]),
            Permission::command("git", vec!["push".into()]),
            Permission::command("git", vec!["remote".into(), "add".into()]),
        ]
    );
}

#[test]
fn test_contextless_and_stack() {
    let r = requirements_ok(
        r#"require { use: { contextless: ["now", "User.save"], stack: 16 } }"#,
    );
    assert_eq!(
        r.permissions,
        vec![
            Permission::contextless(None, "now"),
            Permission::contextless(Some("User"), "save"),
            Permission::Stack { max_height: 16 },
        ]
    );
    assert_eq!(r.stack, Some(16));
}

#[test]
fn test_limits() {
    let r = requirements_ok(r#"require { use: { limits: { "fs/read": 10MB/s, "exec/count": 10 } } }"#);
    assert_eq!(
        r.limits,
        vec![Limit::new("fs/read", 10_000_000), Limit::new("exec/count", 10)]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Conversion errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_kind() {
    assert_eq!(
        requirements_err(r#"require { write: /a }"#),
        RequirementsErrorKind::UnknownKind("write".into())
    );
}

#[test]
fn test_misplaced_key() {
    assert!(matches!(
        requirements_err(r#"require { read: { routines: {} } }"#),
        RequirementsErrorKind::MisplacedKey { expected: "create", .. }
    ));
    assert!(matches!(
        requirements_err(r#"require { read: { commands: { ls: {} } } }"#),
        RequirementsErrorKind::MisplacedKey { expected: "use", .. }
    ));
}

#[test]
fn test_unknown_key() {
    assert!(matches!(
        requirements_err(r#"require { read: { files: "*" } }"#),
        RequirementsErrorKind::UnknownKey { .. }
    ));
}

#[test]
fn test_not_an_entity() {
    assert_eq!(
        requirements_err(r#"require { read: "/a" }"#),
        RequirementsErrorKind::NotAnEntity("a string")
    );
}

#[test]
fn test_too_many_subcommands() {
    assert_eq!(
        requirements_err(r#"require { use: { commands: { git: { a: { b: { c: {} } } } } } }"#),
        RequirementsErrorKind::TooManySubcommands("git".into())
    );
}

#[test]
fn test_imprecise_limit() {
    assert!(matches!(
        requirements_err(r#"require { use: { limits: { "exec/count": 15 } } }"#),
        RequirementsErrorKind::Limit(LimitError::ImpreciseRate { .. })
    ));
}

#[test]
fn test_invalid_stack() {
    assert_eq!(
        requirements_err(r#"require { use: { stack: 0 } }"#),
        RequirementsErrorKind::InvalidStack
    );
}

// ─────────────────────────────────────────────────────────────────────
// Contexts
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_context_checks() {
    let ctx = context(
        r#"require {
            read: { /data/..., globals: "*" }
            use: { globals: "*" }
        }"#,
    );
    assert!(ctx.has(&Permission::path(Read, path("/data/users/a.json"))));
    assert!(!ctx.has(&Permission::path(Read, path("/etc/passwd"))));
    assert!(!ctx.has(&Permission::path(Update, path("/data/a"))));
    assert!(ctx.has(&Permission::global(Use, "log")));

    let err = ctx
        .check(&Permission::global(Update, "x"))
        .unwrap_err();
    assert_eq!(err.permission, Permission::global(Update, "x"));
    assert!(err.to_string().contains("update global x"));
}

#[test]
fn test_attenuated_child_is_subset() {
    let parent = context(
        r#"require {
            read: { /data/..., globals: "*" }
            update: { globals: "*" }
            use: { globals: "*" }
            create: { routines: {} }
        }"#,
    );
    let child = parent.new_without(&[
        Permission::global(Read, "*"),
        Permission::global(Update, "*"),
        Permission::global(Create, "*"),
        Permission::Routine,
    ]);

    for granted in child.granted() {
        assert!(parent.has(granted), "{granted} not held by the parent");
    }
    assert!(child.has(&Permission::path(Read, path("/data/x"))));
    assert!(!child.has(&Permission::global(Read, "a")));
    assert!(!child.has(&Permission::Routine));
    assert!(child.has(&Permission::global(Use, "f")));
}

#[test]
fn test_allow_block_validated() {
    let parent = context(r#"require { read: /data/... }"#);
    let narrower = requirements_ok(r#"require { read: /data/public/... }"#);
    assert!(parent.new_with(narrower.permissions).is_ok());

    let wider = requirements_ok(r#"require { read: /... }"#);
    let err = parent.new_with(wider.permissions).unwrap_err();
    assert!(matches!(err.permission, Permission::Filesystem { kind: Read, .. }));
}

#[test]
fn test_http_host_grant() {
    let ctx = context(r#"require { read: https://example.com }"#);
    assert!(ctx.has(&Permission::url(Read, url("https://example.com/a/b"))));
    assert!(!ctx.has(&Permission::url(Read, url("https://other.com/a"))));
}

#[test]
fn test_url_prefix_grant_resolves_dot_segments() {
    let ctx = Context::new(
        vec![Permission::Http {
            kind: Read,
            entity: HttpEntity::UrlPattern(UrlPattern::new("https://example.com/api/...").unwrap()),
        }],
        vec![],
    );
    assert!(ctx.has(&Permission::url(Read, url("https://example.com/api/users/../items"))));
    for escaping in [
        "https://example.com/api/../admin/secrets",
        "https://example.com/api/%2e%2e/admin/secrets",
        "https://example.com/api/.%2E/admin/secrets",
        "https://example.com/api/./../admin/secrets",
    ] {
        let requested = url(escaping);
        assert_eq!(requested.path(), "/admin/secrets");
        assert!(
            ctx.check(&Permission::url(Read, requested)).is_err(),
            "{escaping} escaped the prefix grant"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────
// Rate limiting
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_limiter_blocks_when_empty() {
    let bucket = TokenBucket::with_available(&Limit::new("test/limit", 10), 0).unwrap();
    let ctx = Context::new(vec![], vec![]).with_limiter(Arc::clone(&bucket));
    assert_eq!(bucket.capacity(), 10);
    assert_eq!(bucket.available(), 0);

    let start = Instant::now();
    ctx.take("test/limit", 5);
    assert!(start.elapsed() >= TICK_INTERVAL);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_unknown_limiter_is_free() {
    let ctx = Context::new(vec![], vec![]);
    let start = Instant::now();
    ctx.take("nothing", 1_000_000);
    assert!(start.elapsed() < TICK_INTERVAL);
}

#[test]
fn test_limits_survive_derivation() {
    let parent = context(r#"require { use: { limits: { "fs/read": 1kB/s } } }"#);
    let child = parent.new_without(&[]);
    let (Some(a), Some(b)) = (parent.limiter("fs/read"), child.limiter("fs/read")) else {
        panic!("limiter missing");
    };
    assert!(Arc::ptr_eq(a, b));
    assert_eq!(a.capacity(), 1000);
}
