//! Warden parser: converts source text into an AST.
//!
//! Scanning and recursive descent are interleaved; there is no token stream.
//! Parsing stops at the first error.

mod parse_expr;
mod parse_literal;
mod parse_module;
mod parse_stmt;
mod parser;

pub use parser::Parser;

use warden_types::ast::{Module, Node};
use warden_types::{ParsingError, SourceFile};

/// Parse a complete module.
pub fn parse_module(source: &SourceFile) -> Result<Module, ParsingError> {
    Parser::new(source).parse()
}

/// Parse a source text holding exactly one expression.
pub fn parse_expression(source: &SourceFile) -> Result<Node, ParsingError> {
    Parser::new(source).parse_standalone_expression()
}
