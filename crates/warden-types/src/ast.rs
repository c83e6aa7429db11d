//! AST node types for the Warden language.
//!
//! Every node carries a [`Span`] for error reporting. The tree is built
//! once by the parser and never mutated. Function bodies, embedded modules
//! and lazy expressions sit behind [`Arc`] so that routines spawned on other
//! threads can share them without copying the subtree.

use std::sync::Arc;

use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete module: optional constants, optional requirements, statements.
///
/// Embedded modules (spawn bodies) use the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub constants: Vec<GlobalConstant>,
    pub requirements: Option<Requirements>,
    pub statements: Vec<Node>,
    pub span: Span,
}

/// `NAME = literal` inside `const ( ... )`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConstant {
    pub name: Ident,
    pub value: Node,
    pub span: Span,
}

/// `require { ... }`: the permissions a module needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirements {
    /// Always an [`NodeKind::Object`] literal.
    pub object: Node,
    pub span: Span,
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

/// A statement or expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether this node is a literal that can be evaluated without any
    /// scope or permission (used for constants, switch cases and permission
    /// objects).
    pub fn is_simple_literal(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Nil
                | NodeKind::Bool(_)
                | NodeKind::Int(_)
                | NodeKind::Float(_)
                | NodeKind::Str(_)
                | NodeKind::Quantity { .. }
                | NodeKind::Rate { .. }
                | NodeKind::IntRange { .. }
                | NodeKind::AbsPath(_)
                | NodeKind::RelPath(_)
                | NodeKind::PathPattern { .. }
                | NodeKind::Url(_)
                | NodeKind::Host(_)
                | NodeKind::UrlPattern { .. }
                | NodeKind::HostPattern(_)
        )
    }
}

/// The kind of node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ── Simple literals ──
    /// `nil`
    Nil,
    /// `true` / `false`
    Bool(bool),
    /// `42`, `-7`
    Int(i64),
    /// `3.14`
    Float(f64),
    /// `"hello"`: JSON string syntax, already decoded
    Str(String),
    /// `10s`, `250ms`, `50%`, `12ln`, `10kB`
    Quantity { value: Number, unit: QuantityUnit },
    /// `10MB/s`
    Rate { value: Number, unit: QuantityUnit },
    /// `1..5`, `1..<5`
    IntRange { start: i64, end: i64, exclusive: bool },
    /// `/etc/hosts`, `/tmp/`
    AbsPath(String),
    /// `./data.json`, `../x`
    RelPath(String),
    /// `/data/*.json` (glob) or `/data/...` (prefix)
    PathPattern { pattern: String, prefix: bool },
    /// `/data/$name$`: interpolated path
    PathExpr { absolute: bool, slices: Vec<Slice> },
    /// `https://example.com/index.html`
    Url(String),
    /// `https://example.com`
    Host(String),
    /// `https://example.com/api/...` (prefix) or `https://example.com/*.json` (glob)
    UrlPattern { pattern: String, prefix: bool },
    /// `https://*.example.com`
    HostPattern(String),
    /// `https://example.com/users/$id$`: interpolated URL
    UrlExpr { slices: Vec<Slice> },

    // ── Composite literals ──
    /// `{ a: 1, "b": 2, 3 }`
    Object(Vec<ObjectProperty>),
    /// `[1, 2, 3]`
    List(Vec<Node>),
    /// `.{a, b}`
    KeyList(Vec<Ident>),
    /// `fn(a, b) { ... }`
    Function(Arc<FunctionExpr>),
    /// `@(expr)`: an unevaluated expression value
    Lazy(Arc<Node>),
    /// `{ statements }` in spawn position
    EmbeddedModule(Arc<Module>),

    // ── Variables ──
    /// `$name`: local variable
    LocalVar(String),
    /// `$$name`: global variable
    GlobalVar(String),
    /// `name`: bare identifier, resolved as a global
    Identifier(String),

    // ── Access ──
    /// `expr.name`: the property name is always static
    Member { object: Box<Node>, property: Ident },
    /// `expr[index]`
    Index { indexed: Box<Node>, index: Box<Node> },
    /// `expr[start:end]`
    Slice {
        indexed: Box<Node>,
        start: Option<Box<Node>>,
        end: Option<Box<Node>>,
    },
    /// `callee(args)` or `callee!(args)`
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
        must: bool,
    },

    // ── Operators ──
    /// `(left op right)`: always parenthesized in source
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `!expr`
    Not(Box<Node>),
    /// `..10`
    UpperBoundRange(Box<Node>),
    /// `(expr)`
    Paren(Box<Node>),

    // ── Routines & modules ──
    /// `sr [group] globals body [allow {...}]`
    Spawn(Box<SpawnExpr>),

    // ── Statements ──
    /// `target = value`
    Assignment { target: Box<Node>, value: Box<Node> },
    If(Box<IfStmt>),
    For(Box<ForStmt>),
    Switch(Box<SwitchStmt>),
    Match(Box<MatchStmt>),
    Break,
    Continue,
    /// `return [expr]`
    Return(Option<Box<Node>>),
    /// `fn name(params) { ... }`
    FunctionDecl(FunctionDecl),
    /// `import name url "checksum" {args} [allow {...}]`
    Import(Box<ImportStmt>),
    /// `{ statements }` as a statement body
    Block(Block),
}

/// The numeric part of a quantity or rate literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Units recognised after a number literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantityUnit {
    Seconds,
    Milliseconds,
    Percent,
    Lines,
    Kilobytes,
    Megabytes,
    Gigabytes,
}

impl QuantityUnit {
    /// Parse a unit suffix.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "s" => Self::Seconds,
            "ms" => Self::Milliseconds,
            "%" => Self::Percent,
            "ln" => Self::Lines,
            "kB" => Self::Kilobytes,
            "MB" => Self::Megabytes,
            "GB" => Self::Gigabytes,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Percent => "%",
            Self::Lines => "ln",
            Self::Kilobytes => "kB",
            Self::Megabytes => "MB",
            Self::Gigabytes => "GB",
        }
    }

    /// Multiplier to bytes for byte units, `None` otherwise.
    pub fn byte_multiplier(&self) -> Option<i64> {
        match self {
            Self::Kilobytes => Some(1_000),
            Self::Megabytes => Some(1_000_000),
            Self::Gigabytes => Some(1_000_000_000),
            _ => None,
        }
    }
}

/// One piece of an interpolated path or URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Slice {
    /// Literal text.
    Literal(String),
    /// `$name$`: the local variable `name`.
    Interpolation(Ident),
}

/// An entry in an object literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperty {
    /// `None` for implicit-key entries.
    pub key: Option<Ident>,
    pub value: Node,
    pub span: Span,
}

// ── Binary Operators ──────────────────────────────────────────────────────────

/// Binary operators. Int and float arithmetic use distinct operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    AddF,
    Sub,
    SubF,
    Mul,
    MulF,
    Div,
    DivF,
    Less,
    LessF,
    LessEq,
    LessEqF,
    Greater,
    GreaterF,
    GreaterEq,
    GreaterEqF,
    Eq,
    NotEq,
    And,
    Or,
    In,
    NotIn,
    Keyof,
    Range,
    ExclusiveRange,
    Match,
    NotMatch,
}

impl BinaryOp {
    /// All operators, longest spelling first so that scanning can take the
    /// first prefix match.
    pub const ALL: &'static [BinaryOp] = &[
        BinaryOp::NotMatch,
        BinaryOp::NotIn,
        BinaryOp::Keyof,
        BinaryOp::Match,
        BinaryOp::LessEqF,
        BinaryOp::GreaterEqF,
        BinaryOp::ExclusiveRange,
        BinaryOp::And,
        BinaryOp::AddF,
        BinaryOp::SubF,
        BinaryOp::MulF,
        BinaryOp::DivF,
        BinaryOp::LessF,
        BinaryOp::GreaterF,
        BinaryOp::LessEq,
        BinaryOp::GreaterEq,
        BinaryOp::Eq,
        BinaryOp::NotEq,
        BinaryOp::Or,
        BinaryOp::In,
        BinaryOp::Range,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Less,
        BinaryOp::Greater,
    ];

    /// Returns the operator symbol for error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::AddF => "+.",
            BinaryOp::Sub => "-",
            BinaryOp::SubF => "-.",
            BinaryOp::Mul => "*",
            BinaryOp::MulF => "*.",
            BinaryOp::Div => "/",
            BinaryOp::DivF => "/.",
            BinaryOp::Less => "<",
            BinaryOp::LessF => "<.",
            BinaryOp::LessEq => "<=",
            BinaryOp::LessEqF => "<=.",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterF => ">.",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::GreaterEqF => ">=.",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not-in",
            BinaryOp::Keyof => "keyof",
            BinaryOp::Range => "..",
            BinaryOp::ExclusiveRange => "..<",
            BinaryOp::Match => "match",
            BinaryOp::NotMatch => "not-match",
        }
    }

    /// Word operators must be followed by a delimiter (`inx` is not `in`).
    pub fn is_word(&self) -> bool {
        self.as_str().starts_with(|c: char| c.is_ascii_alphabetic())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

/// `fn(params) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpr {
    pub params: Vec<Ident>,
    pub body: Block,
    pub span: Span,
}

/// `fn name(params) { body }`: only valid directly inside a module.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub function: Arc<FunctionExpr>,
}

/// `{ statements... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Node>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Control Flow
// ══════════════════════════════════════════════════════════════════════════════

/// `if test { ... } [else { ... } | else if ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub test: Node,
    pub consequent: Block,
    pub alternate: Option<ElseBranch>,
    pub span: Span,
}

/// The else branch of an if statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    ElseIf(Box<IfStmt>),
    Block(Block),
}

/// `for [key,] value in iterated { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub key: Option<Ident>,
    pub value: Ident,
    pub iterated: Node,
    pub body: Block,
    pub span: Span,
}

/// `switch discriminant { literal { ... } ... defaultcase { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub discriminant: Node,
    pub cases: Vec<Case>,
    pub default: Option<Block>,
    pub span: Span,
}

/// `match discriminant { expr { ... } ... defaultcase { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStmt {
    pub discriminant: Node,
    pub cases: Vec<Case>,
    pub default: Option<Block>,
    pub span: Span,
}

/// One case of a switch or match statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub value: Node,
    pub body: Block,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Routines & Imports
// ══════════════════════════════════════════════════════════════════════════════

/// `sr [group] globals body [allow {...}]`
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnExpr {
    /// Local variable accumulating a routine group.
    pub group: Option<Ident>,
    /// `None` when the source says `nil`.
    pub globals: Option<Node>,
    /// A global call, an embedded module or a variable (enforced by the checker).
    pub body: Node,
    /// Object literal of granted permissions.
    pub allow: Option<Node>,
    pub span: Span,
}

/// `import name url "checksum" {args} [allow {...}]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStmt {
    pub name: Ident,
    pub url: String,
    pub checksum: String,
    pub arguments: Node,
    pub allow: Option<Node>,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table_lists_longest_spelling_first() {
        for (i, op) in BinaryOp::ALL.iter().enumerate() {
            for later in &BinaryOp::ALL[i + 1..] {
                assert!(
                    !later.as_str().starts_with(op.as_str()) || later.as_str() == op.as_str(),
                    "'{}' shadows '{}'",
                    op.as_str(),
                    later.as_str()
                );
            }
        }
    }

    #[test]
    fn quantity_unit_suffixes() {
        assert_eq!(QuantityUnit::from_suffix("ms"), Some(QuantityUnit::Milliseconds));
        assert_eq!(QuantityUnit::from_suffix("kB"), Some(QuantityUnit::Kilobytes));
        assert_eq!(QuantityUnit::from_suffix("kb"), None);
        assert_eq!(QuantityUnit::Megabytes.byte_multiplier(), Some(1_000_000));
        assert_eq!(QuantityUnit::Seconds.byte_multiplier(), None);
    }

    #[test]
    fn simple_literals() {
        let lit = Node::new(NodeKind::Int(1), Span::point(0));
        assert!(lit.is_simple_literal());
        let var = Node::new(NodeKind::LocalVar("a".into()), Span::point(0));
        assert!(!var.is_simple_literal());
    }
}
