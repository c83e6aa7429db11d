//! Statement parsing.
//!
//! Compound statements are recognised by looking at the leading identifier;
//! everything else is an expression statement, optionally followed by `=`.

use warden_types::ast::{
    Block, Case, ElseBranch, ForStmt, FunctionDecl, IfStmt, ImportStmt, MatchStmt, Node,
    NodeKind, SwitchStmt,
};
use warden_types::ErrorCode;

use crate::parser::{PResult, Parser};

impl<'src> Parser<'src> {
    /// Statements up to `close` (consumed) or the end of input when `close`
    /// is `None`.
    pub(crate) fn parse_statements(&mut self, close: Option<u8>) -> PResult<Vec<Node>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_statement_separators();
            match (self.peek(), close) {
                (None, None) => return Ok(stmts),
                (None, Some(_)) => return Err(self.unterminated("block")),
                (Some(c), Some(close)) if c == close => {
                    self.pos += 1;
                    return Ok(stmts);
                }
                _ => {}
            }
            stmts.push(self.parse_statement()?);
            self.expect_statement_end(close)?;
        }
    }

    /// A statement ends at a newline, `;`, the enclosing closer or the end of
    /// input.
    pub(crate) fn expect_statement_end(&mut self, close: Option<u8>) -> PResult<()> {
        self.skip_spaces();
        match self.peek() {
            None | Some(b'\n' | b';') => Ok(()),
            Some(c) if Some(c) == close => Ok(()),
            Some(_) => Err(self.unexpected("end of statement")),
        }
    }

    /// `{ statements }`
    pub(crate) fn parse_block(&mut self) -> PResult<Block> {
        let start = self.pos;
        if self.peek() != Some(b'{') {
            return Err(self.unexpected("'{'"));
        }
        self.enter(start)?;
        self.pos += 1;
        let stmts = self.parse_statements(Some(b'}'))?;
        self.leave();
        Ok(Block {
            stmts,
            span: self.span_from(start),
        })
    }

    pub(crate) fn parse_statement(&mut self) -> PResult<Node> {
        let start = self.pos;
        if let Some(word) = self.peek_ident() {
            match word {
                "if" => {
                    let stmt = self.parse_if_stmt()?;
                    return Ok(Node::new(NodeKind::If(Box::new(stmt)), self.span_from(start)));
                }
                "for" => return self.parse_for(),
                "switch" => return self.parse_switch(),
                "match" => return self.parse_match(),
                "break" | "continue" => {
                    self.pos += word.len();
                    let kind = if word == "break" {
                        NodeKind::Break
                    } else {
                        NodeKind::Continue
                    };
                    return Ok(Node::new(kind, self.span_from(start)));
                }
                "return" => return self.parse_return(),
                "fn" if self.is_function_declaration() => return self.parse_function_decl(),
                "import" => return self.parse_import(),
                "const" | "require" => {
                    return Err(self.error(
                        ErrorCode::INVALID_STATEMENT,
                        format!("'{word}' is only allowed at the start of a module"),
                    ))
                }
                "else" | "defaultcase" | "allow" | "in" => {
                    return Err(self.error(
                        ErrorCode::RESERVED_KEYWORD,
                        format!("unexpected keyword '{word}'"),
                    ))
                }
                _ => {}
            }
        }

        let expr = self.parse_expression()?;
        self.skip_spaces();
        if self.peek() == Some(b'=') && self.peek_at(1) != Some(b'=') {
            if !is_assignable(&expr) {
                return Err(self.error_at(
                    ErrorCode::INVALID_STATEMENT,
                    "only variables, their properties and their elements can be assigned",
                    start,
                ));
            }
            self.pos += 1;
            self.skip_whitespace();
            let value = self.parse_expression()?;
            return Ok(Node::new(
                NodeKind::Assignment {
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                self.span_from(start),
            ));
        }
        Ok(expr)
    }

    // ── Control Flow ──────────────────────────────────────────────────────────

    /// `if test { ... } [else if ... | else { ... }]`
    fn parse_if_stmt(&mut self) -> PResult<IfStmt> {
        let start = self.pos;
        self.expect_keyword("if")?;
        self.skip_spaces();
        let test = self.parse_expression()?;
        self.skip_spaces();
        let consequent = self.parse_block()?;

        let save = self.pos;
        self.skip_whitespace();
        let alternate = if self.at_keyword("else") {
            self.pos += "else".len();
            self.skip_spaces();
            if self.at_keyword("if") {
                Some(ElseBranch::ElseIf(Box::new(self.parse_if_stmt()?)))
            } else {
                Some(ElseBranch::Block(self.parse_block()?))
            }
        } else {
            self.pos = save;
            None
        };

        Ok(IfStmt {
            test,
            consequent,
            alternate,
            span: self.span_from(start),
        })
    }

    /// `for [key,] value in iterated { ... }`
    fn parse_for(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.expect_keyword("for")?;
        self.skip_spaces();
        let first = self.expect_ident()?;
        self.skip_spaces();
        let (key, value) = if self.eat(b',') {
            self.skip_spaces();
            (Some(first), self.expect_ident()?)
        } else {
            (None, first)
        };
        self.skip_spaces();
        self.expect_keyword("in")?;
        self.skip_spaces();
        let iterated = self.parse_expression()?;
        self.skip_spaces();
        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(Node::new(
            NodeKind::For(Box::new(ForStmt {
                key,
                value,
                iterated,
                body,
                span,
            })),
            span,
        ))
    }

    fn parse_switch(&mut self) -> PResult<Node> {
        let start = self.pos;
        let (discriminant, cases, default) = self.parse_cases("switch")?;
        let span = self.span_from(start);
        Ok(Node::new(
            NodeKind::Switch(Box::new(SwitchStmt {
                discriminant,
                cases,
                default,
                span,
            })),
            span,
        ))
    }

    fn parse_match(&mut self) -> PResult<Node> {
        let start = self.pos;
        let (discriminant, cases, default) = self.parse_cases("match")?;
        let span = self.span_from(start);
        Ok(Node::new(
            NodeKind::Match(Box::new(MatchStmt {
                discriminant,
                cases,
                default,
                span,
            })),
            span,
        ))
    }

    /// `keyword discriminant { value { ... } ... defaultcase { ... } }`
    fn parse_cases(&mut self, keyword: &str) -> PResult<(Node, Vec<Case>, Option<Block>)> {
        let start = self.pos;
        self.expect_keyword(keyword)?;
        self.skip_spaces();
        let discriminant = self.parse_expression()?;
        self.skip_spaces();
        self.enter(start)?;
        self.expect(b'{')?;

        let mut cases = Vec::new();
        let mut default = None;
        loop {
            self.skip_statement_separators();
            if self.eat(b'}') {
                break;
            }
            if self.at_end() {
                return Err(self.unterminated(&format!("{keyword} statement")));
            }
            if self.at_keyword("defaultcase") {
                if default.is_some() {
                    return Err(self.error(
                        ErrorCode::INVALID_STATEMENT,
                        format!("a {keyword} statement can only have one defaultcase"),
                    ));
                }
                self.pos += "defaultcase".len();
                self.skip_spaces();
                default = Some(self.parse_block()?);
                continue;
            }
            let case_start = self.pos;
            let value = self.parse_expression()?;
            self.skip_spaces();
            let body = self.parse_block()?;
            cases.push(Case {
                value,
                body,
                span: self.span_from(case_start),
            });
        }
        self.leave();
        Ok((discriminant, cases, default))
    }

    /// `return [expr]`
    fn parse_return(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.expect_keyword("return")?;
        self.skip_spaces();
        let value = match self.peek() {
            None | Some(b'\n' | b';' | b'}') => None,
            Some(_) => Some(Box::new(self.parse_expression()?)),
        };
        Ok(Node::new(NodeKind::Return(value), self.span_from(start)))
    }

    // ── Declarations ──────────────────────────────────────────────────────────

    /// `fn` followed by a name rather than a parameter list.
    fn is_function_declaration(&self) -> bool {
        let rest = &self.remaining()[2..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        trimmed.len() < rest.len()
            && trimmed.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
    }

    /// `fn name(params) { ... }`
    fn parse_function_decl(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.expect_keyword("fn")?;
        self.skip_spaces();
        let name = self.expect_ident()?;
        let function = self.parse_function_expr(start)?;
        Ok(Node::new(
            NodeKind::FunctionDecl(FunctionDecl { name, function }),
            self.span_from(start),
        ))
    }

    /// `import name https://host/module.wd "sha256" { args } [allow { ... }]`
    fn parse_import(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.expect_keyword("import")?;
        self.skip_spaces();
        let name = self.expect_ident()?;
        self.skip_spaces();

        if !self.at_url_start() {
            return Err(self.error(
                ErrorCode::INVALID_URL,
                "expected the URL of the imported module",
            ));
        }
        let url_node = self.parse_url_like()?;
        let NodeKind::Url(url) = url_node.kind else {
            return Err(self.error_at(
                ErrorCode::INVALID_URL,
                "the source of an import must be a plain URL",
                url_node.span.start as usize,
            ));
        };
        self.skip_spaces();

        if self.peek() != Some(b'"') {
            return Err(self.unexpected("the module checksum string"));
        }
        let (checksum, _) = self.scan_string_value()?;
        self.skip_spaces();

        if self.peek() != Some(b'{') {
            return Err(self.unexpected("the arguments object"));
        }
        let arguments = self.parse_object()?;
        let allow = self.parse_optional_allow()?;
        self.leave();

        let span = self.span_from(start);
        Ok(Node::new(
            NodeKind::Import(Box::new(ImportStmt {
                name,
                url,
                checksum,
                arguments,
                allow,
                span,
            })),
            span,
        ))
    }
}

/// Variables and member/index chains rooted at a variable.
fn is_assignable(node: &Node) -> bool {
    match &node.kind {
        NodeKind::LocalVar(_) | NodeKind::GlobalVar(_) => true,
        NodeKind::Member { object, .. } => is_assignable(object),
        NodeKind::Index { indexed, .. } => is_assignable(indexed),
        _ => false,
    }
}
