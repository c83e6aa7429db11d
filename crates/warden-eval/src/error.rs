//! Runtime error types for the Warden evaluator.

use std::any::Any;

use thiserror::Error;
use warden_context::{EntityError, LimitError, NotAllowedError, RequirementsError};
use warden_types::{CheckErrors, ParsingError, Span};

use crate::value::Value;

/// Evaluation error: permission denials, runtime traps and host failures.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// An operation needed a permission the current context lacks.
    #[error(transparent)]
    NotAllowed(#[from] NotAllowedError),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("undeclared local variable ${0}")]
    UndeclaredLocal(String),
    #[error("undeclared global variable {0}")]
    UndeclaredGlobal(String),
    #[error("cannot assign to the constant {0}")]
    ConstantReassigned(String),
    #[error("no property '{name}' on {on}")]
    MissingProperty { name: String, on: &'static str },
    #[error("{name} expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("{0} is not callable")]
    NotCallable(&'static str),
    #[error("{on} has no method '{name}'")]
    UnknownMethod { name: String, on: String },
    #[error("cannot iterate over {0}")]
    NotIterable(&'static str),
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("negative index {0}")]
    NegativeIndex(i64),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Limit(#[from] LimitError),
    #[error(transparent)]
    Requirements(#[from] RequirementsError),
    /// A routine fragment failed the static checks.
    #[error("routine body is invalid:\n{0}")]
    Check(CheckErrors),
    #[error("cannot import {url}: {reason}")]
    Import { url: String, reason: String },
    #[error("stack overflow: call depth exceeds {0}")]
    StackOverflow(usize),
    /// A native function reported a failure.
    #[error("{name}: {message}")]
    Native { name: String, message: String },
    #[error("native function {name} panicked: {message}")]
    NativePanic { name: String, message: String },
    #[error("routine panicked: {0}")]
    RoutinePanic(String),
    /// A `must` call received an error result.
    #[error("{name} failed: {message}")]
    MustFailed { name: String, message: String },
    #[error("{0}")]
    Runtime(String),
    /// An error annotated with the span of the statement that raised it.
    #[error("{source} (at {span})")]
    At {
        span: Span,
        source: Box<EvalError>,
    },
}

impl EvalError {
    /// Attach a statement span. Errors that already carry one keep the
    /// innermost location.
    pub fn at(self, span: Span) -> Self {
        match self {
            Self::At { .. } => self,
            other => Self::At {
                span,
                source: Box::new(other),
            },
        }
    }

    /// The error without its location.
    pub fn root(&self) -> &EvalError {
        match self {
            Self::At { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::At { span, .. } => Some(*span),
            _ => None,
        }
    }

    /// The denied permission, if this is a permission failure.
    pub fn not_allowed(&self) -> Option<&NotAllowedError> {
        match self.root() {
            Self::NotAllowed(e) => Some(e),
            _ => None,
        }
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

pub(crate) fn mismatch(expected: &str, found: &Value) -> EvalError {
    EvalError::TypeMismatch(format!("expected {expected}, found {}", found.type_name()))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Top-level errors
// ══════════════════════════════════════════════════════════════════════════════

/// Error returned by [`crate::Runtime::run`].
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    #[error("static check failed:\n{0}")]
    Check(#[from] CheckErrors),
    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

/// Coarse classification of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parsing,
    Check,
    NotAllowed,
    Evaluation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parsing(_) => ErrorKind::Parsing,
            Self::Check(_) => ErrorKind::Check,
            Self::Evaluation(e) if e.not_allowed().is_some() => ErrorKind::NotAllowed,
            Self::Evaluation(_) => ErrorKind::Evaluation,
        }
    }

    pub fn not_allowed(&self) -> Option<&NotAllowedError> {
        match self {
            Self::Evaluation(e) => e.not_allowed(),
            _ => None,
        }
    }
}
