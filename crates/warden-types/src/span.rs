use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span, as byte offsets into the module text.
///
/// `end` is exclusive. Offsets are resolved to 1-based line/column pairs
/// through [`SourceFile::position`] only when an error is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    /// Create a zero-width span at a single offset.
    pub fn point(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Holds the source text of a module for error reporting.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets for fast line lookup.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based line number.
    ///
    /// Returns `None` if the line number is out of range.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        if idx >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| s.saturating_sub(1)) // strip the \n
            .unwrap_or(self.source.len());
        let line = &self.source[start..end];
        Some(line.trim_end_matches('\r'))
    }

    /// Resolve a byte offset to a 1-based `(line, column)` pair.
    ///
    /// Offsets past the end of the text resolve to the last position.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[idx];
        let col = self.source[line_start..offset].chars().count() + 1;
        (idx as u32 + 1, col as u32)
    }

    /// The source line containing `offset`, for error context.
    pub fn line_at(&self, offset: usize) -> &str {
        let (line, _) = self.position(offset);
        self.line(line).unwrap_or("")
    }

    /// Get the total number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
