use thiserror::Error;
use warden_types::Span;

use crate::Permission;

/// A permission check failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("not allowed, missing permission: {permission}")]
pub struct NotAllowedError {
    /// The permission that was required.
    pub permission: Permission,
}

impl NotAllowedError {
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

/// An entity literal could not be turned into a path, URL, host or pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("invalid path '{0}': paths start with '/', './' or '../'")]
    InvalidPath(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid host '{0}'")]
    InvalidHost(String),

    #[error("cannot resolve relative path '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

/// A rate limit could not be set up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("limit '{name}' has a zero rate")]
    ZeroRate { name: String },

    #[error(
        "limit '{name}' is too imprecise: {rate}/s does not refill by a whole number of tokens every {tick_ms}ms"
    )]
    ImpreciseRate { name: String, rate: u64, tick_ms: u64 },

    #[error("limit '{name}' of {rate}/s is looser than the inherited {inherited}/s")]
    Loosened { name: String, rate: u64, inherited: u64 },
}

/// A `require` or `allow` object could not be converted into permissions.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct RequirementsError {
    /// Location of the offending node.
    pub span: Span,
    pub reason: RequirementsErrorKind,
}

impl RequirementsError {
    pub(crate) fn new(span: Span, reason: RequirementsErrorKind) -> Self {
        Self { span, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequirementsErrorKind {
    #[error("permissions must be described by an object literal")]
    NotAnObject,

    #[error("top-level entries must be keyed by a permission kind")]
    MissingKind,

    #[error("unknown permission kind '{0}'")]
    UnknownKind(String),

    #[error("unknown key '{key}' in '{kind}' permissions")]
    UnknownKey { kind: String, key: String },

    #[error("'{key}' is only valid under '{expected}'")]
    MisplacedKey { key: String, expected: &'static str },

    #[error("expected a path, URL, host or pattern literal, found {0}")]
    NotAnEntity(&'static str),

    #[error("'globals' must be \"*\" or a list of names")]
    InvalidGlobals,

    #[error("'commands' must be an object of command names to objects of subcommands")]
    InvalidCommands,

    #[error("command '{0}' has more than two levels of subcommands")]
    TooManySubcommands(String),

    #[error("'contextless' must be a list of \"name\" or \"Type.name\" strings")]
    InvalidContextless,

    #[error("limit '{0}' must be a byte rate or an integer")]
    InvalidLimit(String),

    #[error("'stack' must be a positive integer")]
    InvalidStack,

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Limit(#[from] LimitError),
}
