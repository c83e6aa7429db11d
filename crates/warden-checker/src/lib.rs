//! Warden static checker.
//!
//! ```text
//! Source → Parser → Checker → Evaluator
//! ```
//!
//! The checker runs once over a whole module before anything is evaluated,
//! and again over every fragment a routine is spawned with. Any error it
//! reports is fatal.

mod checker;

pub use checker::Checker;

use tracing::debug;
use warden_types::ast::{Module, Node};
use warden_types::{CheckErrors, SourceFile};

/// Check a parsed module. The result is empty when the module is valid.
pub fn check_module(module: &Module, source: &SourceFile) -> CheckErrors {
    let mut errors = CheckErrors::empty();
    Checker::new(&mut errors, source).check_module(module);
    debug!(file = %source.name, errors = errors.total_errors, "checked module");
    errors
}

/// Check a standalone fragment, such as the body of a spawned routine.
pub fn check_fragment(node: &Node, source: &SourceFile) -> CheckErrors {
    let mut errors = CheckErrors::empty();
    Checker::new(&mut errors, source).check_fragment(node);
    errors
}
