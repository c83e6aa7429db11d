//! Expression parsing.
//!
//! Dispatch happens on the leading character of the expression. Binary
//! expressions are always parenthesized, so there is no precedence climbing.

use std::sync::Arc;

use warden_types::ast::{
    BinaryOp, FunctionExpr, Ident, Node, NodeKind, ObjectProperty, SpawnExpr,
};
use warden_types::ErrorCode;

use crate::parser::{is_keyword, PResult, Parser};

impl<'src> Parser<'src> {
    /// Parse one expression, including postfix member/index/call chains.
    pub(crate) fn parse_expression(&mut self) -> PResult<Node> {
        self.nest()?;
        let result = self.parse_expression_inner();
        self.unnest();
        result
    }

    fn parse_expression_inner(&mut self) -> PResult<Node> {
        let Some(c) = self.peek() else {
            return Err(self.unexpected("an expression"));
        };
        match c {
            b'$' => {
                let variable = self.parse_variable()?;
                self.parse_postfix(variable)
            }
            b'0'..=b'9' => self.parse_number_like(),
            b'-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.parse_number_like(),
            b'/' => self.parse_path_like(),
            b'.' if self.starts_with("./") || self.starts_with("../") => self.parse_path_like(),
            b'.' if self.starts_with(".{") => self.parse_key_list(),
            b'.' if self.starts_with("..") => self.parse_upper_bound_range(),
            b'{' => self.parse_object(),
            b'[' => {
                let list = self.parse_list()?;
                self.parse_postfix(list)
            }
            b'"' => self.parse_string(),
            b'(' => self.parse_paren_or_binary(),
            b'@' => self.parse_lazy(),
            b'!' => self.parse_not(),
            _ if self.at_url_start() => self.parse_url_like(),
            _ if self.at_ident_start() => self.parse_identifier_expression(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    // ── Variables & Identifiers ───────────────────────────────────────────────

    /// `$name` (local) or `$$name` (global).
    pub(crate) fn parse_variable(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.expect(b'$')?;
        let global = self.eat(b'$');
        if !self.at_ident_start() {
            return Err(self.unexpected("a variable name"));
        }
        let name = self.scan_ident().name;
        let kind = if global {
            NodeKind::GlobalVar(name)
        } else {
            NodeKind::LocalVar(name)
        };
        Ok(Node::new(kind, self.span_from(start)))
    }

    /// Keyword literals, function literals, spawn expressions, or a bare
    /// identifier with its postfix chain.
    fn parse_identifier_expression(&mut self) -> PResult<Node> {
        let start = self.pos;
        let word = self.peek_ident().unwrap_or_default();
        match word {
            "nil" | "true" | "false" => {
                self.pos += word.len();
                let kind = match word {
                    "nil" => NodeKind::Nil,
                    w => NodeKind::Bool(w == "true"),
                };
                Ok(Node::new(kind, self.span_from(start)))
            }
            "fn" => {
                self.pos += 2;
                let function = self.parse_function_expr(start)?;
                Ok(Node::new(NodeKind::Function(function), self.span_from(start)))
            }
            "sr" => self.parse_spawn(),
            w if is_keyword(w) => Err(self.error(
                ErrorCode::RESERVED_KEYWORD,
                format!("'{w}' is a keyword and cannot start an expression"),
            )),
            _ => {
                let ident = self.scan_ident();
                let node = Node::new(NodeKind::Identifier(ident.name), ident.span);
                self.parse_postfix(node)
            }
        }
    }

    // ── Postfix ───────────────────────────────────────────────────────────────

    /// `.name`, `[index]`, `[start:end]`, `(args)`, `!(args)`; all must be
    /// directly attached to the expression they apply to.
    pub(crate) fn parse_postfix(&mut self, mut node: Node) -> PResult<Node> {
        loop {
            let start = node.span.start as usize;
            match self.peek() {
                Some(b'.') if self.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic() || c == b'_') => {
                    self.pos += 1;
                    let property = self.scan_ident();
                    node = Node::new(
                        NodeKind::Member {
                            object: Box::new(node),
                            property,
                        },
                        self.span_from(start),
                    );
                }
                Some(b'[') => node = self.parse_index_or_slice(node)?,
                Some(b'(') => node = self.parse_call(node, false)?,
                Some(b'!') if self.peek_at(1) == Some(b'(') => {
                    self.pos += 1;
                    node = self.parse_call(node, true)?;
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_call(&mut self, callee: Node, must: bool) -> PResult<Node> {
        let start = callee.span.start as usize;
        self.enter(self.pos)?;
        self.expect(b'(')?;
        let args = self.parse_sequence(b')', "argument list")?;
        self.leave();
        Ok(Node::new(
            NodeKind::Call {
                callee: Box::new(callee),
                args,
                must,
            },
            self.span_from(start),
        ))
    }

    fn parse_index_or_slice(&mut self, indexed: Node) -> PResult<Node> {
        let start = indexed.span.start as usize;
        self.enter(self.pos)?;
        self.expect(b'[')?;
        self.skip_whitespace();
        let first = if self.peek() == Some(b':') {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.skip_whitespace();

        if self.eat(b':') {
            self.skip_whitespace();
            let end = if self.peek() == Some(b']') {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.skip_whitespace();
            self.expect(b']')?;
            self.leave();
            return Ok(Node::new(
                NodeKind::Slice {
                    indexed: Box::new(indexed),
                    start: first,
                    end,
                },
                self.span_from(start),
            ));
        }

        self.expect(b']')?;
        self.leave();
        let Some(index) = first else {
            return Err(self.error_at(ErrorCode::UNEXPECTED_CHAR, "expected an index", start));
        };
        Ok(Node::new(
            NodeKind::Index {
                indexed: Box::new(indexed),
                index,
            },
            self.span_from(start),
        ))
    }

    /// Items separated by commas and/or whitespace, up to `close`.
    pub(crate) fn parse_sequence(&mut self, close: u8, what: &str) -> PResult<Vec<Node>> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(close) {
                return Ok(items);
            }
            if self.at_end() {
                return Err(self.unterminated(what));
            }
            items.push(self.parse_expression()?);
            self.expect_item_end(close)?;
        }
    }

    /// After an item: a separator or the closing character.
    fn expect_item_end(&self, close: u8) -> PResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(c) if c == close || c == b',' || c.is_ascii_whitespace() => Ok(()),
            Some(_) => Err(self.unexpected(&format!("',' or '{}'", close as char))),
        }
    }

    // ── Composite Literals ────────────────────────────────────────────────────

    /// `{ key: value, "quoted key": value, implicit }`
    pub(crate) fn parse_object(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.expect(b'{')?;
        let mut properties = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(b'}') {
                break;
            }
            if self.at_end() {
                return Err(self.unterminated("object literal"));
            }
            let property_start = self.pos;
            let key = self.parse_property_key()?;
            if key.is_some() {
                self.skip_whitespace();
            }
            let value = self.parse_expression()?;
            properties.push(ObjectProperty {
                key,
                value,
                span: self.span_from(property_start),
            });
            self.expect_item_end(b'}')?;
        }
        self.leave();
        Ok(Node::new(NodeKind::Object(properties), self.span_from(start)))
    }

    /// `name:` or `"name":`. Restores the cursor when no key is present.
    fn parse_property_key(&mut self) -> PResult<Option<Ident>> {
        let start = self.pos;
        if self.peek() == Some(b'"') {
            let (name, span) = self.scan_string_value()?;
            self.skip_spaces();
            if self.eat(b':') {
                return Ok(Some(Ident::new(name, span)));
            }
        } else if self.at_ident_start() && !self.at_url_start() {
            let ident = self.scan_ident();
            self.skip_spaces();
            if self.eat(b':') {
                return Ok(Some(ident));
            }
        }
        self.pos = start;
        Ok(None)
    }

    /// `[a, b, c]`
    fn parse_list(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.expect(b'[')?;
        let items = self.parse_sequence(b']', "list literal")?;
        self.leave();
        Ok(Node::new(NodeKind::List(items), self.span_from(start)))
    }

    /// `.{a, b}`
    pub(crate) fn parse_key_list(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.pos += 2;
        let mut keys = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(b'}') {
                break;
            }
            if self.at_end() {
                return Err(self.unterminated("key list"));
            }
            keys.push(self.expect_ident()?);
            self.expect_item_end(b'}')?;
        }
        self.leave();
        Ok(Node::new(NodeKind::KeyList(keys), self.span_from(start)))
    }

    /// `fn(a, b) { ... }`. The cursor is just past `fn` (or the declared name).
    pub(crate) fn parse_function_expr(&mut self, start: usize) -> PResult<Arc<FunctionExpr>> {
        self.skip_spaces();
        self.enter(start)?;
        self.expect(b'(')?;
        let mut params = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(b')') {
                break;
            }
            if self.at_end() {
                return Err(self.unterminated("parameter list"));
            }
            params.push(self.expect_ident()?);
            self.expect_item_end(b')')?;
        }
        self.skip_spaces();
        let body = self.parse_block()?;
        self.leave();
        Ok(Arc::new(FunctionExpr {
            params,
            body,
            span: self.span_from(start),
        }))
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    /// `(expr)` or `(left op right)`.
    fn parse_paren_or_binary(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.expect(b'(')?;
        self.skip_whitespace();
        let left = self.parse_expression()?;
        self.skip_whitespace();

        if self.eat(b')') {
            self.leave();
            let paren = Node::new(NodeKind::Paren(Box::new(left)), self.span_from(start));
            return self.parse_postfix(paren);
        }
        if self.at_end() {
            return Err(self.unterminated("parenthesized expression"));
        }

        let op = self.scan_binary_operator().ok_or_else(|| {
            self.error(ErrorCode::INVALID_OPERATOR, "expected a binary operator or ')'")
        })?;
        self.skip_whitespace();
        let right = self.parse_expression()?;
        self.skip_whitespace();
        if self.at_end() {
            return Err(self.unterminated("binary expression"));
        }
        if !self.eat(b')') {
            return Err(self.unexpected("')' (a binary expression has exactly two operands)"));
        }
        self.leave();
        Ok(Node::new(
            NodeKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            self.span_from(start),
        ))
    }

    /// Operators must be followed by whitespace.
    fn scan_binary_operator(&mut self) -> Option<BinaryOp> {
        let op = BinaryOp::ALL.iter().copied().find(|op| {
            let s = op.as_str();
            self.starts_with(s) && self.peek_at(s.len()).is_some_and(|c| c.is_ascii_whitespace())
        })?;
        self.pos += op.as_str().len();
        Some(op)
    }

    /// `@(expr)`
    fn parse_lazy(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.pos += 1;
        self.expect(b'(')?;
        self.skip_whitespace();
        let expr = self.parse_expression()?;
        self.skip_whitespace();
        self.expect(b')')?;
        self.leave();
        Ok(Node::new(NodeKind::Lazy(Arc::new(expr)), self.span_from(start)))
    }

    /// `!expr`
    fn parse_not(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.pos += 1;
        let operand = self.parse_expression()?;
        Ok(Node::new(NodeKind::Not(Box::new(operand)), self.span_from(start)))
    }

    /// `..10`
    fn parse_upper_bound_range(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.pos += 2;
        if self.peek() == Some(b'.') {
            return Err(self.error(ErrorCode::UNEXPECTED_CHAR, "unexpected '...'"));
        }
        let upper = self.parse_expression()?;
        Ok(Node::new(
            NodeKind::UpperBoundRange(Box::new(upper)),
            self.span_from(start),
        ))
    }

    // ── Routines ──────────────────────────────────────────────────────────────

    /// `sr [group] globals body [allow {...}]`
    pub(crate) fn parse_spawn(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.expect_keyword("sr")?;
        self.skip_spaces();

        let group = match self.peek_ident() {
            Some(word) if word != "nil" => {
                let group = self.expect_ident()?;
                self.skip_spaces();
                Some(group)
            }
            _ => None,
        };

        let globals = if self.at_keyword("nil") {
            self.pos += 3;
            None
        } else {
            match self.peek() {
                Some(b'{') => Some(self.parse_object()?),
                Some(b'.') if self.starts_with(".{") => Some(self.parse_key_list()?),
                Some(b'$') => Some(self.parse_variable()?),
                _ => {
                    return Err(self.unexpected(
                        "routine globals (nil, an object, a key list or a variable)",
                    ))
                }
            }
        };
        self.skip_spaces();

        let body = if self.peek() == Some(b'{') {
            self.parse_embedded_module()?
        } else {
            self.parse_expression()?
        };
        let allow = self.parse_optional_allow()?;
        self.leave();

        Ok(Node::new(
            NodeKind::Spawn(Box::new(SpawnExpr {
                group,
                globals,
                body,
                allow,
                span: self.span_from(start),
            })),
            self.span_from(start),
        ))
    }

    /// `allow { ... }` on the same line, if present.
    pub(crate) fn parse_optional_allow(&mut self) -> PResult<Option<Node>> {
        let save = self.pos;
        self.skip_spaces();
        if !self.at_keyword("allow") {
            self.pos = save;
            return Ok(None);
        }
        self.pos += "allow".len();
        self.skip_spaces();
        if self.peek() != Some(b'{') {
            return Err(self.unexpected("'{' after 'allow'"));
        }
        Ok(Some(self.parse_object()?))
    }
}
