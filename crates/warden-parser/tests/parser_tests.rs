//! Parser tests: statements, expressions, module structure and error
//! positions.

use warden_parser::{parse_expression, parse_module};
use warden_types::ast::*;
use warden_types::{ErrorCode, ParsingError, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> Result<Module, ParsingError> {
    let sf = SourceFile::new("test.wd", source);
    parse_module(&sf)
}

/// Parse source and return the module, panicking on error.
fn parse_ok(source: &str) -> Module {
    match parse(source) {
        Ok(module) => module,
        Err(e) => panic!("unexpected parsing error: {e}"),
    }
}

fn parse_err(source: &str) -> ParsingError {
    match parse(source) {
        Ok(module) => panic!("expected a parsing error, got {module:?}"),
        Err(e) => e,
    }
}

fn assert_error(source: &str, code: ErrorCode) {
    let err = parse_err(source);
    assert_eq!(err.code, code, "wrong error code for {source:?}: {err}");
}

fn expr(source: &str) -> NodeKind {
    let sf = SourceFile::new("test.wd", source);
    match parse_expression(&sf) {
        Ok(node) => node.kind,
        Err(e) => panic!("unexpected parsing error: {e}"),
    }
}

/// The single statement of a module.
fn stmt(source: &str) -> NodeKind {
    let mut module = parse_ok(source);
    assert_eq!(module.statements.len(), 1, "expected exactly one statement");
    module.statements.remove(0).kind
}

// ─────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_local_assignment() {
    let NodeKind::Assignment { target, value } = stmt("$a = 1") else {
        panic!("expected assignment");
    };
    assert_eq!(target.kind, NodeKind::LocalVar("a".into()));
    assert_eq!(value.kind, NodeKind::Int(1));
}

#[test]
fn test_global_and_member_assignment() {
    let module = parse_ok("$$count = 0\n$user.name = \"x\"\n$list[0] = 1");
    assert_eq!(module.statements.len(), 3);
    let NodeKind::Assignment { target, .. } = &module.statements[0].kind else {
        panic!("expected assignment");
    };
    assert_eq!(target.kind, NodeKind::GlobalVar("count".into()));
    let NodeKind::Assignment { target, .. } = &module.statements[1].kind else {
        panic!("expected assignment");
    };
    assert!(matches!(&target.kind, NodeKind::Member { property, .. } if property.name == "name"));
    let NodeKind::Assignment { target, .. } = &module.statements[2].kind else {
        panic!("expected assignment");
    };
    assert!(matches!(target.kind, NodeKind::Index { .. }));
}

#[test]
fn test_semicolon_separated_statements() {
    let module = parse_ok("$a = 1; $user = makeUser(); return [($a + 2), $user.Name]");
    assert_eq!(module.statements.len(), 3);

    let NodeKind::Return(Some(value)) = &module.statements[2].kind else {
        panic!("expected return with a value");
    };
    let NodeKind::List(items) = &value.kind else {
        panic!("expected list");
    };
    assert_eq!(items.len(), 2);
    assert!(matches!(
        &items[0].kind,
        NodeKind::Binary { op: BinaryOp::Add, .. }
    ));
    assert!(matches!(
        &items[1].kind,
        NodeKind::Member { property, .. } if property.name == "Name"
    ));
}

#[test]
fn test_if_else_chain() {
    let NodeKind::If(stmt) = stmt(
        r#"if $a {
    $b = 1
} else if $c {
    $b = 2
} else {
    $b = 3
}"#,
    ) else {
        panic!("expected if");
    };
    assert_eq!(stmt.test.kind, NodeKind::LocalVar("a".into()));
    assert_eq!(stmt.consequent.stmts.len(), 1);
    let Some(ElseBranch::ElseIf(else_if)) = &stmt.alternate else {
        panic!("expected else if");
    };
    assert!(matches!(else_if.alternate, Some(ElseBranch::Block(_))));
}

#[test]
fn test_if_without_else_keeps_next_statement() {
    let module = parse_ok("if true { $a = 1 }\n$b = 2");
    assert_eq!(module.statements.len(), 2);
}

#[test]
fn test_for_with_key_and_value() {
    let NodeKind::For(stmt) = stmt("for i, e in [10, 20] { $sum = $e }") else {
        panic!("expected for");
    };
    assert_eq!(stmt.key.as_ref().map(|k| k.name.as_str()), Some("i"));
    assert_eq!(stmt.value.name, "e");
    assert!(matches!(stmt.iterated.kind, NodeKind::List(_)));
}

#[test]
fn test_for_over_range() {
    let NodeKind::For(stmt) = stmt("for n in 1..<4 { }") else {
        panic!("expected for");
    };
    assert!(stmt.key.is_none());
    assert_eq!(
        stmt.iterated.kind,
        NodeKind::IntRange {
            start: 1,
            end: 4,
            exclusive: true
        }
    );
}

#[test]
fn test_switch_with_default() {
    let NodeKind::Switch(stmt) = stmt(
        r#"switch $x {
    1 { $y = "one" }
    2 { $y = "two" }
    defaultcase { $y = "many" }
}"#,
    ) else {
        panic!("expected switch");
    };
    assert_eq!(stmt.cases.len(), 2);
    assert_eq!(stmt.cases[1].value.kind, NodeKind::Int(2));
    assert!(stmt.default.is_some());
}

#[test]
fn test_match_with_patterns() {
    let NodeKind::Match(stmt) = stmt(
        r#"match $path {
    /tmp/... { $kind = "temp" }
    /data/*.json { $kind = "data" }
}"#,
    ) else {
        panic!("expected match");
    };
    assert_eq!(stmt.cases.len(), 2);
    assert!(matches!(
        stmt.cases[0].value.kind,
        NodeKind::PathPattern { prefix: true, .. }
    ));
}

#[test]
fn test_duplicate_defaultcase_rejected() {
    assert_error(
        "switch 1 { defaultcase { } defaultcase { } }",
        ErrorCode::INVALID_STATEMENT,
    );
}

#[test]
fn test_break_continue_return() {
    let module = parse_ok("for e in $l {\n  break\n  continue\n}\nreturn");
    let NodeKind::For(stmt) = &module.statements[0].kind else {
        panic!("expected for");
    };
    assert_eq!(stmt.body.stmts[0].kind, NodeKind::Break);
    assert_eq!(stmt.body.stmts[1].kind, NodeKind::Continue);
    assert_eq!(module.statements[1].kind, NodeKind::Return(None));
}

#[test]
fn test_function_declaration() {
    let NodeKind::FunctionDecl(decl) = stmt("fn add(a, b) { return ($a + $b) }") else {
        panic!("expected function declaration");
    };
    assert_eq!(decl.name.name, "add");
    let params: Vec<_> = decl.function.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(params, ["a", "b"]);
    assert_eq!(decl.function.body.stmts.len(), 1);
}

#[test]
fn test_function_literal_assignment() {
    let NodeKind::Assignment { value, .. } = stmt("$f = fn(x) { return $x }") else {
        panic!("expected assignment");
    };
    assert!(matches!(value.kind, NodeKind::Function(_)));
}

#[test]
fn test_import_statement() {
    let NodeKind::Import(import) = stmt(
        r#"import lib https://example.com/lib.wd "aBc123" {x: 1} allow {read: /tmp/...}"#,
    ) else {
        panic!("expected import");
    };
    assert_eq!(import.name.name, "lib");
    assert_eq!(import.url, "https://example.com/lib.wd");
    assert_eq!(import.checksum, "aBc123");
    assert!(matches!(import.arguments.kind, NodeKind::Object(ref props) if props.len() == 1));
    assert!(import.allow.is_some());
}

#[test]
fn test_import_requires_plain_url() {
    assert_error(
        r#"import lib https://example.com/... "00" {}"#,
        ErrorCode::INVALID_URL,
    );
}

#[test]
fn test_invalid_assignment_target() {
    assert_error("f() = 1", ErrorCode::INVALID_STATEMENT);
}

#[test]
fn test_comments_are_skipped() {
    let module = parse_ok("# leading comment\n$a = 1 # trailing\n\n# another\n$b = 2");
    assert_eq!(module.statements.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_variables() {
    assert_eq!(expr("$x"), NodeKind::LocalVar("x".into()));
    assert_eq!(expr("$$x"), NodeKind::GlobalVar("x".into()));
    assert_eq!(expr("x"), NodeKind::Identifier("x".into()));
}

#[test]
fn test_keyword_literals() {
    assert_eq!(expr("nil"), NodeKind::Nil);
    assert_eq!(expr("true"), NodeKind::Bool(true));
    assert_eq!(expr("false"), NodeKind::Bool(false));
}

#[test]
fn test_binary_operators() {
    let cases = [
        ("(1 + 2)", BinaryOp::Add),
        ("(1.0 +. 2.0)", BinaryOp::AddF),
        ("(1 <= 2)", BinaryOp::LessEq),
        ("(1.0 <=. 2.0)", BinaryOp::LessEqF),
        ("($a == $b)", BinaryOp::Eq),
        ("($a != $b)", BinaryOp::NotEq),
        ("($a and $b)", BinaryOp::And),
        ("($a not-in $b)", BinaryOp::NotIn),
        ("(a keyof $o)", BinaryOp::Keyof),
        ("(1 ..< 3)", BinaryOp::ExclusiveRange),
        ("($p match /tmp/...)", BinaryOp::Match),
        ("($p not-match /tmp/...)", BinaryOp::NotMatch),
    ];
    for (source, expected) in cases {
        match expr(source) {
            NodeKind::Binary { op, .. } => assert_eq!(op, expected, "{source}"),
            other => panic!("expected binary for {source}, got {other:?}"),
        }
    }
}

#[test]
fn test_binary_requires_exactly_two_operands() {
    assert_error("$a = (1 + 2 + 3)", ErrorCode::UNEXPECTED_CHAR);
}

#[test]
fn test_unknown_operator() {
    assert_error("$a = (1 % 2)", ErrorCode::INVALID_OPERATOR);
}

#[test]
fn test_parenthesized_expression() {
    assert!(matches!(expr("($a)"), NodeKind::Paren(_)));
}

#[test]
fn test_calls_and_must_calls() {
    let NodeKind::Call { callee, args, must } = expr("f(1, \"a\" $b)") else {
        panic!("expected call");
    };
    assert_eq!(callee.kind, NodeKind::Identifier("f".into()));
    assert_eq!(args.len(), 3);
    assert!(!must);

    let NodeKind::Call { must, .. } = expr("f!()") else {
        panic!("expected must call");
    };
    assert!(must);
}

#[test]
fn test_namespaced_call() {
    let NodeKind::Call { callee, .. } = expr("http.get(1)") else {
        panic!("expected call");
    };
    let NodeKind::Member { object, property } = callee.kind else {
        panic!("expected member callee");
    };
    assert_eq!(object.kind, NodeKind::Identifier("http".into()));
    assert_eq!(property.name, "get");
}

#[test]
fn test_index_and_slices() {
    assert!(matches!(expr("$l[1]"), NodeKind::Index { .. }));
    let NodeKind::Slice { start, end, .. } = expr("$l[1:]") else {
        panic!("expected slice");
    };
    assert!(start.is_some());
    assert!(end.is_none());
    let NodeKind::Slice { start, end, .. } = expr("$l[:2]") else {
        panic!("expected slice");
    };
    assert!(start.is_none());
    assert!(end.is_some());
}

#[test]
fn test_object_literal_keys() {
    let NodeKind::Object(props) = expr(r#"{a: 1, "b c": 2, 3}"#) else {
        panic!("expected object");
    };
    assert_eq!(props.len(), 3);
    assert_eq!(props[0].key.as_ref().map(|k| k.name.as_str()), Some("a"));
    assert_eq!(props[1].key.as_ref().map(|k| k.name.as_str()), Some("b c"));
    assert!(props[2].key.is_none());
}

#[test]
fn test_object_implicit_url_entry() {
    let NodeKind::Object(props) = expr("{https://example.com, read: /tmp/}") else {
        panic!("expected object");
    };
    assert!(props[0].key.is_none());
    assert_eq!(props[0].value.kind, NodeKind::Host("https://example.com".into()));
    assert_eq!(props[1].value.kind, NodeKind::AbsPath("/tmp/".into()));
}

#[test]
fn test_multiline_object() {
    let NodeKind::Object(props) = expr("{\n  a: 1\n  b: {\n    c: 2\n  }\n}") else {
        panic!("expected object");
    };
    assert_eq!(props.len(), 2);
}

#[test]
fn test_key_list() {
    let NodeKind::KeyList(keys) = expr(".{a, b}") else {
        panic!("expected key list");
    };
    let names: Vec<_> = keys.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn test_lazy_and_not() {
    assert!(matches!(expr("@($a)"), NodeKind::Lazy(_)));
    assert!(matches!(expr("!true"), NodeKind::Not(_)));
}

#[test]
fn test_keyword_cannot_start_expression() {
    assert_error("$a = if", ErrorCode::RESERVED_KEYWORD);
}

// ─────────────────────────────────────────────────────────────────────
// Spawn expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_spawn_global_call() {
    let NodeKind::Assignment { value, .. } = stmt("$r = sr nil f(1)") else {
        panic!("expected assignment");
    };
    let NodeKind::Spawn(spawn) = value.kind else {
        panic!("expected spawn");
    };
    assert!(spawn.group.is_none());
    assert!(spawn.globals.is_none());
    assert!(matches!(spawn.body.kind, NodeKind::Call { .. }));
    assert!(spawn.allow.is_none());
}

#[test]
fn test_spawn_group_module_and_allow() {
    let NodeKind::Spawn(spawn) =
        stmt(r#"sr grp {a: 1} { return $$a } allow { use: {globals: "*"} }"#)
    else {
        panic!("expected spawn");
    };
    assert_eq!(spawn.group.as_ref().map(|g| g.name.as_str()), Some("grp"));
    assert!(matches!(spawn.globals.as_ref().map(|g| &g.kind), Some(NodeKind::Object(_))));
    let NodeKind::EmbeddedModule(module) = &spawn.body.kind else {
        panic!("expected embedded module");
    };
    assert_eq!(module.statements.len(), 1);
    assert!(spawn.allow.is_some());
}

#[test]
fn test_spawn_key_list_globals() {
    let NodeKind::Spawn(spawn) = stmt("sr .{a, b} $f") else {
        panic!("expected spawn");
    };
    assert!(matches!(spawn.globals.as_ref().map(|g| &g.kind), Some(NodeKind::KeyList(_))));
    assert_eq!(spawn.body.kind, NodeKind::LocalVar("f".into()));
}

#[test]
fn test_spawn_requires_globals() {
    assert_error("sr f()", ErrorCode::UNEXPECTED_CHAR);
}

// ─────────────────────────────────────────────────────────────────────
// Module structure
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_constants_and_requirements() {
    let module = parse_ok(
        r#"const (
    HOST = https://example.com
    LIMIT = 10
)

require {
    read: /data/...
    use: {globals: "*"}
}

$a = LIMIT
"#,
    );
    assert_eq!(module.constants.len(), 2);
    assert_eq!(module.constants[0].name.name, "HOST");
    assert_eq!(module.constants[1].value.kind, NodeKind::Int(10));
    let requirements = module.requirements.expect("requirements");
    assert!(matches!(requirements.object.kind, NodeKind::Object(ref p) if p.len() == 2));
    assert_eq!(module.statements.len(), 1);
}

#[test]
fn test_constant_must_be_literal() {
    assert_error("const (\n  A = $x\n)", ErrorCode::INVALID_STATEMENT);
}

#[test]
fn test_const_not_allowed_mid_module() {
    assert_error("$a = 1\nconst (A = 1)", ErrorCode::INVALID_STATEMENT);
}

#[test]
fn test_empty_module() {
    let module = parse_ok("\n  \n");
    assert!(module.statements.is_empty());
    assert!(module.constants.is_empty());
    assert!(module.requirements.is_none());
}

// ─────────────────────────────────────────────────────────────────────
// Error reporting
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_error_position() {
    let err = parse_err("$a = 1\n$b = ?");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_CHAR);
    assert_eq!(err.line, 2);
    assert_eq!(err.column, 6);
    assert_eq!(err.source_line, "$b = ?");
    assert_eq!(err.file, "test.wd");
}

#[test]
fn test_unterminated_object_reports_construct_start() {
    let err = parse_err("$a = {a: 1");
    assert_eq!(err.code, ErrorCode::UNTERMINATED);
    assert_eq!(err.offset, 5);
    assert_eq!(err.construct_start, Some(5));
}

#[test]
fn test_unterminated_block() {
    assert_error("if true {\n $a = 1\n", ErrorCode::UNTERMINATED);
}

#[test]
fn test_unterminated_string() {
    assert_error("$a = \"abc", ErrorCode::UNTERMINATED);
}

#[test]
fn test_missing_statement_separator() {
    assert_error("$a = 1 $b = 2", ErrorCode::UNEXPECTED_CHAR);
}

#[test]
fn test_nesting_limit() {
    let source = format!("$a = {}{}", "[".repeat(200), "]".repeat(200));
    assert_error(&source, ErrorCode::NESTING_TOO_DEEP);
}
