//! Module-level parsing: `const (...)`, `require {...}` and embedded modules.

use std::sync::Arc;

use warden_types::ast::{GlobalConstant, Module, Node, NodeKind, Requirements};
use warden_types::ErrorCode;

use crate::parser::{PResult, Parser};

impl<'src> Parser<'src> {
    /// `[const (...)] [require {...}] statement*` up to `close`.
    pub(crate) fn parse_module_body(&mut self, start: usize, close: Option<u8>) -> PResult<Module> {
        self.skip_statement_separators();
        let constants = if self.at_keyword("const") {
            self.parse_constants()?
        } else {
            Vec::new()
        };

        self.skip_statement_separators();
        let requirements = if self.at_keyword("require") {
            Some(self.parse_requirements()?)
        } else {
            None
        };

        let statements = self.parse_statements(close)?;
        Ok(Module {
            constants,
            requirements,
            statements,
            span: self.span_from(start),
        })
    }

    /// `const ( NAME = literal ... )`
    fn parse_constants(&mut self) -> PResult<Vec<GlobalConstant>> {
        let start = self.pos;
        self.expect_keyword("const")?;
        self.skip_spaces();
        self.enter(start)?;
        self.expect(b'(')?;

        let mut constants = Vec::new();
        loop {
            self.skip_statement_separators();
            if self.eat(b')') {
                break;
            }
            if self.at_end() {
                return Err(self.unterminated("constant declarations"));
            }
            let constant_start = self.pos;
            let name = self.expect_ident()?;
            self.skip_spaces();
            self.expect(b'=')?;
            self.skip_spaces();
            let value = self.parse_expression()?;
            if !value.is_simple_literal() {
                return Err(self.error_at(
                    ErrorCode::INVALID_STATEMENT,
                    format!("the value of constant '{}' must be a simple literal", name.name),
                    value.span.start as usize,
                ));
            }
            constants.push(GlobalConstant {
                name,
                value,
                span: self.span_from(constant_start),
            });
            self.expect_statement_end(Some(b')'))?;
        }
        self.leave();
        Ok(constants)
    }

    /// `require { ... }`
    fn parse_requirements(&mut self) -> PResult<Requirements> {
        let start = self.pos;
        self.expect_keyword("require")?;
        self.skip_spaces();
        if self.peek() != Some(b'{') {
            return Err(self.unexpected("'{' after 'require'"));
        }
        let object = self.parse_object()?;
        Ok(Requirements {
            object,
            span: self.span_from(start),
        })
    }

    /// `{ statements }` in the body position of a spawn expression.
    pub(crate) fn parse_embedded_module(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.enter(start)?;
        self.expect(b'{')?;
        let module = self.parse_module_body(start, Some(b'}'))?;
        self.leave();
        Ok(Node::new(
            NodeKind::EmbeddedModule(Arc::new(module)),
            self.span_from(start),
        ))
    }
}
