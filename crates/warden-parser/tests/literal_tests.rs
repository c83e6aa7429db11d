//! Literal classification: paths, patterns, URLs, hosts, quantities, rates,
//! ranges and strings.

use warden_parser::parse_expression;
use warden_types::ast::*;
use warden_types::{ErrorCode, SourceFile};

fn expr(source: &str) -> NodeKind {
    let sf = SourceFile::new("test.wd", source);
    match parse_expression(&sf) {
        Ok(node) => node.kind,
        Err(e) => panic!("unexpected parsing error for {source:?}: {e}"),
    }
}

fn assert_error(source: &str, code: ErrorCode) {
    let sf = SourceFile::new("test.wd", source);
    match parse_expression(&sf) {
        Ok(node) => panic!("expected {code} for {source:?}, got {:?}", node.kind),
        Err(e) => assert_eq!(e.code, code, "wrong error code for {source:?}: {e}"),
    }
}

// ── Paths ──────────────────────────────────────────────────────────────

#[test]
fn test_absolute_and_relative_paths() {
    assert_eq!(expr("/etc/hosts"), NodeKind::AbsPath("/etc/hosts".into()));
    assert_eq!(expr("/tmp/"), NodeKind::AbsPath("/tmp/".into()));
    assert_eq!(expr("./data.json"), NodeKind::RelPath("./data.json".into()));
    assert_eq!(expr("../x"), NodeKind::RelPath("../x".into()));
}

#[test]
fn test_glob_path_pattern() {
    assert_eq!(
        expr("/data/*.json"),
        NodeKind::PathPattern {
            pattern: "/data/*.json".into(),
            prefix: false
        }
    );
    assert!(matches!(
        expr("/data/file?.txt"),
        NodeKind::PathPattern { prefix: false, .. }
    ));
    assert!(matches!(
        expr("/data/[ab].txt"),
        NodeKind::PathPattern { prefix: false, .. }
    ));
}

#[test]
fn test_prefix_path_pattern() {
    assert_eq!(
        expr("/data/..."),
        NodeKind::PathPattern {
            pattern: "/data/...".into(),
            prefix: true
        }
    );
    assert!(matches!(expr("/..."), NodeKind::PathPattern { prefix: true, .. }));
}

#[test]
fn test_misplaced_prefix_marker_rejected() {
    assert_error("/data/.../", ErrorCode::INVALID_PATTERN);
    assert_error("/data/.../x", ErrorCode::INVALID_PATTERN);
    assert_error("/data...", ErrorCode::INVALID_PATTERN);
}

#[test]
fn test_glob_and_prefix_rejected() {
    assert_error("/data/*/...", ErrorCode::INVALID_PATTERN);
}

#[test]
fn test_relative_pattern_rejected() {
    assert_error("./*.json", ErrorCode::INVALID_PATTERN);
}

#[test]
fn test_interpolated_path() {
    let NodeKind::PathExpr { absolute, slices } = expr("/data/$name$") else {
        panic!("expected path expression");
    };
    assert!(absolute);
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0], Slice::Literal("/data/".into()));
    assert!(matches!(&slices[1], Slice::Interpolation(ident) if ident.name == "name"));
}

#[test]
fn test_interpolations_in_distinct_segments() {
    let NodeKind::PathExpr { slices, .. } = expr("/$dir$/$file$.txt") else {
        panic!("expected path expression");
    };
    assert_eq!(slices.len(), 5);
    assert_eq!(slices[4], Slice::Literal(".txt".into()));
}

#[test]
fn test_adjacent_interpolations_rejected() {
    assert_error("/data/$a$$b$", ErrorCode::INVALID_INTERPOLATION);
    assert_error("/data/$a$-$b$", ErrorCode::INVALID_INTERPOLATION);
}

#[test]
fn test_unterminated_interpolation_rejected() {
    assert_error("/data/$name", ErrorCode::INVALID_INTERPOLATION);
    assert_error("/data/$$", ErrorCode::INVALID_INTERPOLATION);
}

#[test]
fn test_interpolated_pattern_rejected() {
    assert_error("/data/$dir$/*.json", ErrorCode::INVALID_PATTERN);
    assert_error("/data/$dir$/...", ErrorCode::INVALID_PATTERN);
}

// ── URLs & hosts ───────────────────────────────────────────────────────

#[test]
fn test_host_literals() {
    assert_eq!(expr("https://example.com"), NodeKind::Host("https://example.com".into()));
    assert_eq!(
        expr("http://localhost:8080"),
        NodeKind::Host("http://localhost:8080".into())
    );
    assert_eq!(
        expr("https://*.example.com"),
        NodeKind::HostPattern("https://*.example.com".into())
    );
}

#[test]
fn test_url_literals() {
    assert_eq!(
        expr("https://example.com/index.html"),
        NodeKind::Url("https://example.com/index.html".into())
    );
    assert_eq!(
        expr("https://example.com/search?q=a"),
        NodeKind::Url("https://example.com/search?q=a".into())
    );
}

#[test]
fn test_url_patterns() {
    assert_eq!(
        expr("https://example.com/api/..."),
        NodeKind::UrlPattern {
            pattern: "https://example.com/api/...".into(),
            prefix: true
        }
    );
    assert!(matches!(
        expr("https://example.com/*.json"),
        NodeKind::UrlPattern { prefix: false, .. }
    ));
}

#[test]
fn test_interpolated_url() {
    let NodeKind::UrlExpr { slices } = expr("https://example.com/users/$id$") else {
        panic!("expected URL expression");
    };
    assert_eq!(slices[0], Slice::Literal("https://example.com/users/".into()));
    assert!(matches!(&slices[1], Slice::Interpolation(ident) if ident.name == "id"));
}

#[test]
fn test_invalid_urls() {
    assert_error("https://*.example.com/x", ErrorCode::INVALID_URL);
    assert_error("https:///x", ErrorCode::INVALID_URL);
    assert_error("https://exa$mple.com", ErrorCode::INVALID_URL);
    assert_error("https://example.com/.../x", ErrorCode::INVALID_PATTERN);
}

// ── Numbers, quantities, rates, ranges ─────────────────────────────────

#[test]
fn test_numbers() {
    assert_eq!(expr("42"), NodeKind::Int(42));
    assert_eq!(expr("-7"), NodeKind::Int(-7));
    assert_eq!(expr("3.5"), NodeKind::Float(3.5));
    assert_error("99999999999999999999", ErrorCode::INVALID_NUMBER);
}

#[test]
fn test_quantities() {
    assert_eq!(
        expr("10s"),
        NodeKind::Quantity {
            value: Number::Int(10),
            unit: QuantityUnit::Seconds
        }
    );
    assert_eq!(
        expr("1.5ms"),
        NodeKind::Quantity {
            value: Number::Float(1.5),
            unit: QuantityUnit::Milliseconds
        }
    );
    assert_eq!(
        expr("50%"),
        NodeKind::Quantity {
            value: Number::Int(50),
            unit: QuantityUnit::Percent
        }
    );
    assert_eq!(
        expr("12ln"),
        NodeKind::Quantity {
            value: Number::Int(12),
            unit: QuantityUnit::Lines
        }
    );
    assert_error("10xyz", ErrorCode::INVALID_QUANTITY);
}

#[test]
fn test_rates() {
    assert_eq!(
        expr("10kB/s"),
        NodeKind::Rate {
            value: Number::Int(10),
            unit: QuantityUnit::Kilobytes
        }
    );
    assert_error("10s/s", ErrorCode::INVALID_RATE);
    assert_error("10MB/min", ErrorCode::INVALID_RATE);
}

#[test]
fn test_integer_ranges() {
    assert_eq!(
        expr("1..5"),
        NodeKind::IntRange {
            start: 1,
            end: 5,
            exclusive: false
        }
    );
    assert_eq!(
        expr("1..<4"),
        NodeKind::IntRange {
            start: 1,
            end: 4,
            exclusive: true
        }
    );
    assert_eq!(
        expr("-2..2"),
        NodeKind::IntRange {
            start: -2,
            end: 2,
            exclusive: false
        }
    );
    assert_error("1.5..3", ErrorCode::INVALID_NUMBER);
    assert_error("1..", ErrorCode::INVALID_NUMBER);
}

#[test]
fn test_upper_bound_range() {
    let NodeKind::UpperBoundRange(upper) = expr("..10") else {
        panic!("expected upper-bound range");
    };
    assert_eq!(upper.kind, NodeKind::Int(10));
}

// ── Strings ────────────────────────────────────────────────────────────

#[test]
fn test_json_strings() {
    assert_eq!(expr(r#""hello""#), NodeKind::Str("hello".into()));
    assert_eq!(expr(r#""a\nbA""#), NodeKind::Str("a\nbA".into()));
    assert_eq!(expr(r#""say \"hi\"""#), NodeKind::Str("say \"hi\"".into()));
}

#[test]
fn test_invalid_escape_rejected() {
    assert_error(r#""\q""#, ErrorCode::INVALID_STRING);
}
