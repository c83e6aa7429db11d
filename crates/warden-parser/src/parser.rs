//! Core parser infrastructure: byte cursor, trivia, error reporting.

use warden_types::ast::{Ident, Module, Node};
use warden_types::{ErrorCode, ParsingError, SourceFile, Span};

pub(crate) type PResult<T> = Result<T, ParsingError>;

/// Maximum nesting of expressions and blocks.
pub(crate) const MAX_NESTING: u32 = 128;

/// Words that can never be used as identifiers.
pub(crate) const KEYWORDS: &[&str] = &[
    "if",
    "else",
    "for",
    "in",
    "switch",
    "match",
    "defaultcase",
    "break",
    "continue",
    "return",
    "fn",
    "import",
    "sr",
    "allow",
    "const",
    "require",
    "nil",
    "true",
    "false",
    "and",
    "or",
    "keyof",
];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Bytes that end a path-like or URL-like literal.
pub(crate) fn is_delimiter(c: u8) -> bool {
    c.is_ascii_whitespace() || matches!(c, b',' | b';' | b')' | b']' | b'}')
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// The Warden parser.
///
/// Reads the source one byte at a time, dispatching on the leading character
/// of each construct. Every method returns at the first error; the error
/// carries the start offset of the innermost construct being parsed.
pub struct Parser<'src> {
    /// The full source text as bytes.
    source: &'src [u8],
    text: &'src str,
    /// Current byte offset into `source`.
    pub(crate) pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Start offsets of the enclosing constructs.
    constructs: Vec<usize>,
    /// Current nesting depth.
    depth: u32,
}

impl<'src> Parser<'src> {
    /// Create a new parser over a source file.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            text: &source_file.source,
            pos: 0,
            source_file,
            constructs: Vec::new(),
            depth: 0,
        }
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    pub(crate) fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub(crate) fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s.as_bytes())
    }

    /// If the current byte is `c`, consume it and return `true`.
    pub(crate) fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, c: u8) -> PResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", c as char)))
        }
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &'src str {
        &self.text[start..end]
    }

    /// The unparsed rest of the source.
    pub(crate) fn remaining(&self) -> &'src str {
        &self.text[self.pos..]
    }

    pub(crate) fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.pos)
    }

    pub(crate) fn at_delimiter(&self) -> bool {
        self.peek().is_none_or(is_delimiter)
    }

    /// Advance until a delimiter or the end of input.
    pub(crate) fn scan_to_delimiter(&mut self) {
        while !self.at_delimiter() {
            self.pos += 1;
        }
    }

    pub(crate) fn at_url_start(&self) -> bool {
        self.starts_with("https://") || self.starts_with("http://")
    }

    // ── Trivia ────────────────────────────────────────────────────────────────

    /// Skip spaces, tabs and comments on the current line.
    pub(crate) fn skip_spaces(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(b'#') if self.skip_comment() => {}
                _ => return,
            }
        }
    }

    /// Skip spaces, comments and newlines.
    pub(crate) fn skip_whitespace(&mut self) {
        loop {
            self.skip_spaces();
            if !self.eat(b'\n') {
                return;
            }
        }
    }

    /// Skip whitespace and commas between the items of a list-like construct.
    pub(crate) fn skip_separators(&mut self) {
        loop {
            self.skip_whitespace();
            if !self.eat(b',') {
                return;
            }
        }
    }

    /// Skip whitespace and semicolons between statements.
    pub(crate) fn skip_statement_separators(&mut self) {
        loop {
            self.skip_whitespace();
            if !self.eat(b';') {
                return;
            }
        }
    }

    /// A comment is `#` followed by whitespace, up to the end of the line.
    fn skip_comment(&mut self) -> bool {
        let commented = self.peek_at(1).is_none_or(|c| c == b' ' || c == b'\t' || c == b'\n');
        if !commented {
            return false;
        }
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.pos += 1;
        }
        true
    }

    // ── Identifiers ───────────────────────────────────────────────────────────

    pub(crate) fn at_ident_start(&self) -> bool {
        self.peek().is_some_and(is_ident_start)
    }

    /// The identifier at the cursor, without consuming it.
    pub(crate) fn peek_ident(&self) -> Option<&'src str> {
        if !self.at_ident_start() {
            return None;
        }
        let len = self.source[self.pos..]
            .iter()
            .take_while(|&&c| is_ident_continue(c))
            .count();
        Some(self.slice(self.pos, self.pos + len))
    }

    pub(crate) fn at_keyword(&self, keyword: &str) -> bool {
        self.peek_ident() == Some(keyword)
    }

    /// Consume an identifier, keywords included. The caller checks
    /// [`Self::at_ident_start`] first.
    pub(crate) fn scan_ident(&mut self) -> Ident {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Ident::new(self.slice(start, self.pos), self.span_from(start))
    }

    /// Expect a non-keyword identifier.
    pub(crate) fn expect_ident(&mut self) -> PResult<Ident> {
        match self.peek_ident() {
            Some(word) if is_keyword(word) => Err(self.error(
                ErrorCode::RESERVED_KEYWORD,
                format!("'{word}' is a keyword and cannot be used as a name"),
            )),
            Some(_) => Ok(self.scan_ident()),
            None => Err(self.unexpected("identifier")),
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> PResult<Span> {
        if self.at_keyword(keyword) {
            let start = self.pos;
            self.pos += keyword.len();
            Ok(self.span_from(start))
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    // ── Constructs ────────────────────────────────────────────────────────────

    /// Enter a compound construct starting at `start`.
    pub(crate) fn enter(&mut self, start: usize) -> PResult<()> {
        self.nest()?;
        self.constructs.push(start);
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.constructs.pop();
        self.unnest();
    }

    pub(crate) fn nest(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(
                ErrorCode::NESTING_TOO_DEEP,
                format!("nesting exceeds the maximum depth of {MAX_NESTING}"),
            ));
        }
        Ok(())
    }

    pub(crate) fn unnest(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn construct_start(&self) -> usize {
        self.constructs.last().copied().unwrap_or(0)
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// An error at the current position.
    pub(crate) fn error(&self, code: ErrorCode, message: impl Into<String>) -> ParsingError {
        self.error_at(code, message, self.pos)
    }

    /// An error at a specific byte offset.
    pub(crate) fn error_at(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        offset: usize,
    ) -> ParsingError {
        ParsingError::new(
            self.source_file,
            code,
            message,
            offset,
            self.constructs.last().copied(),
        )
    }

    /// "expected X, got Y" at the current position.
    pub(crate) fn unexpected(&self, expected: &str) -> ParsingError {
        match self.text[self.pos..].chars().next() {
            None => self.error(
                ErrorCode::UNEXPECTED_EOF,
                format!("expected {expected}, got end of input"),
            ),
            Some('\n') => self.error(
                ErrorCode::UNEXPECTED_CHAR,
                format!("expected {expected}, got end of line"),
            ),
            Some(c) => self.error(
                ErrorCode::UNEXPECTED_CHAR,
                format!("expected {expected}, got '{c}'"),
            ),
        }
    }

    /// An unterminated construct, reported at the construct's start.
    pub(crate) fn unterminated(&self, what: &str) -> ParsingError {
        self.error_at(
            ErrorCode::UNTERMINATED,
            format!("unterminated {what}"),
            self.construct_start(),
        )
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the whole source as a module.
    pub fn parse(mut self) -> PResult<Module> {
        self.parse_module_body(0, None)
    }

    /// Parse the whole source as a single expression.
    pub fn parse_standalone_expression(mut self) -> PResult<Node> {
        self.skip_whitespace();
        let node = self.parse_expression()?;
        self.skip_whitespace();
        if !self.at_end() {
            return Err(self.unexpected("end of input"));
        }
        Ok(node)
    }
}
