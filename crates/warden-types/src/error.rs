use crate::{SourceFile, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of check errors reported before fail-fast.
pub const MAX_ERRORS: usize = 20;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Parsing,
    Check,
}

/// Numeric error code (E100–E299).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Parsing errors (E100–E199) ──
    pub const UNEXPECTED_CHAR: Self = Self(100);
    pub const UNEXPECTED_EOF: Self = Self(101);
    pub const UNTERMINATED: Self = Self(102);
    pub const INVALID_NUMBER: Self = Self(103);
    pub const INVALID_QUANTITY: Self = Self(104);
    pub const INVALID_RATE: Self = Self(105);
    pub const INVALID_STRING: Self = Self(106);
    pub const INVALID_PATH: Self = Self(107);
    pub const INVALID_PATTERN: Self = Self(108);
    pub const INVALID_URL: Self = Self(109);
    pub const INVALID_INTERPOLATION: Self = Self(110);
    pub const INVALID_OPERATOR: Self = Self(111);
    pub const INVALID_STATEMENT: Self = Self(112);
    pub const RESERVED_KEYWORD: Self = Self(113);
    pub const NESTING_TOO_DEEP: Self = Self(114);

    // ── Check errors (E200–E299) ──
    pub const DUPLICATE_KEY: Self = Self(200);
    pub const INVALID_SPAWN_BODY: Self = Self(201);
    pub const MISPLACED_FUNCTION: Self = Self(202);
    pub const DUPLICATE_FUNCTION: Self = Self(203);
    pub const FUNCTION_SHADOWS_GLOBAL: Self = Self(204);
    pub const CONSTANT_REASSIGNED: Self = Self(205);
    pub const DUPLICATE_CONSTANT: Self = Self(206);
    pub const MISPLACED_BREAK: Self = Self(207);
    pub const MISPLACED_CONTINUE: Self = Self(208);
    pub const INVALID_PERMISSIONS: Self = Self(209);
    pub const IMPORT_SHADOWS_GLOBAL: Self = Self(210);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            200..=299 => ErrorCategory::Check,
            _ => ErrorCategory::Parsing,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsing => write!(f, "parsing"),
            Self::Check => write!(f, "check"),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ParsingError
// ══════════════════════════════════════════════════════════════════════════════

/// Malformed source. Parsing stops at the first one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingError {
    /// Source file name.
    pub file: String,
    pub code: ErrorCode,
    pub message: String,
    /// Byte offset of the offending input.
    pub offset: usize,
    /// Start offset of the construct being parsed when the error occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub construct_start: Option<usize>,
    /// 1-based line of `offset`.
    pub line: u32,
    /// 1-based column of `offset`.
    pub column: u32,
    /// The exact source line for context.
    pub source_line: String,
}

impl ParsingError {
    /// Create an error, resolving `offset` against `source`.
    pub fn new(
        source: &SourceFile,
        code: ErrorCode,
        message: impl Into<String>,
        offset: usize,
        construct_start: Option<usize>,
    ) -> Self {
        let (line, column) = source.position(offset);
        Self {
            file: source.name.clone(),
            code,
            message: message.into(),
            offset,
            construct_start,
            line,
            column,
            source_line: source.line_at(offset).to_string(),
        }
    }
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [parsing] {}",
            self.file, self.line, self.column, self.code, self.message
        )
    }
}

impl std::error::Error for ParsingError {}

// ══════════════════════════════════════════════════════════════════════════════
// CheckError
// ══════════════════════════════════════════════════════════════════════════════

/// Valid syntax, invalid semantics. Reported by the static checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckError {
    pub file: String,
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
    pub line: u32,
    pub column: u32,
    pub source_line: String,
}

impl CheckError {
    pub fn new(source: &SourceFile, code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        let (line, column) = source.position(span.start as usize);
        Self {
            file: source.name.clone(),
            code,
            message: message.into(),
            span,
            line,
            column,
            source_line: source.line_at(span.start as usize).to_string(),
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [check] {}",
            self.file, self.line, self.column, self.code, self.message
        )
    }
}

impl std::error::Error for CheckError {}

/// The errors collected by one checker run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckErrors {
    pub errors: Vec<CheckError>,
    pub total_errors: usize,
}

impl CheckErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS limit.
    pub fn push_error(&mut self, error: CheckError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Whether any collected error carries `code`.
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

impl fmt::Display for CheckErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.first() {
            Some(first) if self.total_errors > 1 => {
                write!(f, "{first} (and {} more)", self.total_errors - 1)
            }
            Some(first) => write!(f, "{first}"),
            None => write!(f, "no check errors"),
        }
    }
}

impl std::error::Error for CheckErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::UNEXPECTED_CHAR.category(), ErrorCategory::Parsing);
        assert_eq!(ErrorCode::INVALID_PATTERN.category(), ErrorCategory::Parsing);
        assert_eq!(ErrorCode::DUPLICATE_KEY.category(), ErrorCategory::Check);
        assert_eq!(ErrorCode::MISPLACED_BREAK.category(), ErrorCategory::Check);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::DUPLICATE_KEY), "E200");
        assert_eq!(format!("{}", ErrorCode::UNEXPECTED_CHAR), "E100");
    }

    #[test]
    fn test_parsing_error_resolves_position() {
        let src = SourceFile::new("test.wd", "$a = 1\n$b = ?\n");
        let err = ParsingError::new(&src, ErrorCode::UNEXPECTED_CHAR, "unexpected '?'", 12, Some(7));
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 6);
        assert_eq!(err.source_line, "$b = ?");
        assert_eq!(format!("{err}"), "test.wd:2:6: E100 [parsing] unexpected '?'");
    }

    #[test]
    fn test_check_error_json_serialization() {
        let src = SourceFile::new("main.wd", "{a: 1, a: 2}");
        let err = CheckError::new(&src, ErrorCode::DUPLICATE_KEY, "duplicate key 'a'", Span::new(7, 8));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":200"));
        assert!(json.contains("\"line\":1"));
        assert!(json.contains("\"column\":8"));

        let back: CheckError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_check_errors_max_limit() {
        let src = SourceFile::new("test.wd", "x");
        let mut errs = CheckErrors::empty();
        for i in 0..25 {
            errs.push_error(CheckError::new(
                &src,
                ErrorCode::DUPLICATE_KEY,
                format!("Error {i}"),
                Span::point(0),
            ));
        }
        assert_eq!(errs.errors.len(), 20);
        assert_eq!(errs.total_errors, 25);
        assert!(errs.has_errors());
        assert!(errs.contains(ErrorCode::DUPLICATE_KEY));
        assert!(format!("{errs}").ends_with("(and 24 more)"));
    }

    #[test]
    fn test_check_errors_empty() {
        let errs = CheckErrors::empty();
        assert!(!errs.has_errors());
        assert_eq!(errs.total_errors, 0);
    }
}
