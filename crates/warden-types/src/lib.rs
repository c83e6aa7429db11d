//! Shared types for the Warden runtime.
//!
//! This crate defines the AST node types, source spans, error types,
//! and other shared data structures used by the parser, the checker
//! and the evaluator.

mod error;
mod span;
pub mod ast;

pub use error::{CheckError, CheckErrors, ErrorCategory, ErrorCode, ParsingError, MAX_ERRORS};
pub use span::{SourceFile, Span};
