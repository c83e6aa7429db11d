//! Literal scanning and classification: numbers, quantities, rates, ranges,
//! strings, paths and URLs.
//!
//! Path-like and URL-like literals are scanned greedily up to the next
//! delimiter and then classified from their text, so that the permission
//! engine can tell a literal path from a pattern without evaluating anything.

use warden_types::ast::{Ident, Node, NodeKind, Number, QuantityUnit, Slice};
use warden_types::{ErrorCode, Span};

use crate::parser::{PResult, Parser};

/// Characters that turn a path into a glob pattern.
const PATH_GLOB_CHARS: [char; 3] = ['*', '?', '['];

impl<'src> Parser<'src> {
    // ── Numbers ───────────────────────────────────────────────────────────────

    fn skip_digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// `42`, `-1.5`, `10s`, `50%`, `1kB/s`, `1..5`, `0..<3`
    pub(crate) fn parse_number_like(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.eat(b'-');
        self.skip_digits();
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            self.skip_digits();
        }
        let text = self.slice(start, self.pos);

        if self.starts_with("..") {
            if is_float {
                return Err(self.error_at(
                    ErrorCode::INVALID_NUMBER,
                    "range bounds must be integers",
                    start,
                ));
            }
            let lower = self.parse_int(text, start)?;
            return self.parse_int_range(start, lower);
        }

        let number = if is_float {
            Number::Float(text.parse::<f64>().map_err(|_| {
                self.error_at(ErrorCode::INVALID_NUMBER, format!("invalid float '{text}'"), start)
            })?)
        } else {
            Number::Int(self.parse_int(text, start)?)
        };

        if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == b'%') {
            return self.parse_quantity(start, number);
        }

        let kind = match number {
            Number::Int(i) => NodeKind::Int(i),
            Number::Float(f) => NodeKind::Float(f),
        };
        Ok(Node::new(kind, self.span_from(start)))
    }

    fn parse_int(&self, text: &str, start: usize) -> PResult<i64> {
        text.parse::<i64>().map_err(|_| {
            self.error_at(
                ErrorCode::INVALID_NUMBER,
                format!("invalid integer '{text}'"),
                start,
            )
        })
    }

    /// After the lower bound: `..5` or `..<5`.
    fn parse_int_range(&mut self, start: usize, lower: i64) -> PResult<Node> {
        self.pos += 2;
        let exclusive = self.eat(b'<');
        let upper_start = self.pos;
        self.eat(b'-');
        if self.skip_digits() == 0 {
            return Err(self.error(ErrorCode::INVALID_NUMBER, "expected the upper bound of the range"));
        }
        let upper = self.parse_int(self.slice(upper_start, self.pos), upper_start)?;
        Ok(Node::new(
            NodeKind::IntRange {
                start: lower,
                end: upper,
                exclusive,
            },
            self.span_from(start),
        ))
    }

    /// The unit suffix of a quantity, optionally followed by `/s`.
    fn parse_quantity(&mut self, start: usize, value: Number) -> PResult<Node> {
        let unit_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == b'%') {
            self.pos += 1;
        }
        let suffix = self.slice(unit_start, self.pos);
        let unit = QuantityUnit::from_suffix(suffix).ok_or_else(|| {
            self.error_at(
                ErrorCode::INVALID_QUANTITY,
                format!("unknown unit '{suffix}'"),
                unit_start,
            )
        })?;

        if self.peek() != Some(b'/') {
            return Ok(Node::new(NodeKind::Quantity { value, unit }, self.span_from(start)));
        }

        let rate_start = self.pos;
        self.pos += 1;
        if !(self.eat(b's') && self.at_delimiter()) {
            return Err(self.error_at(
                ErrorCode::INVALID_RATE,
                "only per-second rates ('/s') are supported",
                rate_start,
            ));
        }
        if unit.byte_multiplier().is_none() {
            return Err(self.error_at(
                ErrorCode::INVALID_RATE,
                format!("'{}' quantities cannot form a rate, only byte quantities can", unit.as_str()),
                unit_start,
            ));
        }
        Ok(Node::new(NodeKind::Rate { value, unit }, self.span_from(start)))
    }

    // ── Strings ───────────────────────────────────────────────────────────────

    /// Scan a JSON string literal and decode it.
    pub(crate) fn scan_string_value(&mut self) -> PResult<(String, Span)> {
        let start = self.pos;
        self.expect(b'"')?;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(self.error_at(
                        ErrorCode::UNTERMINATED,
                        "unterminated string literal",
                        start,
                    ))
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.advance();
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        let raw = self.slice(start, self.pos);
        let value: String = serde_json::from_str(raw).map_err(|e| {
            self.error_at(
                ErrorCode::INVALID_STRING,
                format!("invalid string literal: {e}"),
                start,
            )
        })?;
        Ok((value, self.span_from(start)))
    }

    pub(crate) fn parse_string(&mut self) -> PResult<Node> {
        let (value, span) = self.scan_string_value()?;
        Ok(Node::new(NodeKind::Str(value), span))
    }

    // ── Paths ─────────────────────────────────────────────────────────────────

    /// `/etc/hosts`, `./x`, `/data/*.json`, `/data/...`, `/data/$name$`
    pub(crate) fn parse_path_like(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.scan_to_delimiter();
        let text = self.slice(start, self.pos);
        let span = self.span_from(start);
        let absolute = text.starts_with('/');
        let is_glob = text.contains(PATH_GLOB_CHARS);

        if text.contains('$') {
            if is_glob || text.contains("...") {
                return Err(self.error_at(
                    ErrorCode::INVALID_PATTERN,
                    "path patterns cannot be interpolated",
                    start,
                ));
            }
            let slices = self.interpolation_slices(text, start)?;
            return Ok(Node::new(NodeKind::PathExpr { absolute, slices }, span));
        }

        if let Some(idx) = text.find("...") {
            self.check_prefix_pattern(text, idx, start, &PATH_GLOB_CHARS)?;
            self.check_absolute_pattern(absolute, start)?;
            return Ok(Node::new(
                NodeKind::PathPattern {
                    pattern: text.to_string(),
                    prefix: true,
                },
                span,
            ));
        }

        if is_glob {
            self.check_absolute_pattern(absolute, start)?;
            return Ok(Node::new(
                NodeKind::PathPattern {
                    pattern: text.to_string(),
                    prefix: false,
                },
                span,
            ));
        }

        let kind = if absolute {
            NodeKind::AbsPath(text.to_string())
        } else {
            NodeKind::RelPath(text.to_string())
        };
        Ok(Node::new(kind, span))
    }

    /// `...` may only appear once, at the very end, after a `/`; and a prefix
    /// pattern cannot also be a glob.
    fn check_prefix_pattern(
        &self,
        text: &str,
        idx: usize,
        start: usize,
        glob_chars: &[char],
    ) -> PResult<()> {
        if idx + 3 != text.len() || !text[..idx].ends_with('/') {
            return Err(self.error_at(
                ErrorCode::INVALID_PATTERN,
                "'...' is only allowed at the end of a pattern, after a '/'",
                start + idx,
            ));
        }
        if text[..idx].contains(glob_chars) {
            return Err(self.error_at(
                ErrorCode::INVALID_PATTERN,
                "a pattern cannot be both a prefix pattern and a glob pattern",
                start,
            ));
        }
        Ok(())
    }

    fn check_absolute_pattern(&self, absolute: bool, start: usize) -> PResult<()> {
        if absolute {
            Ok(())
        } else {
            Err(self.error_at(
                ErrorCode::INVALID_PATTERN,
                "path patterns must be absolute",
                start,
            ))
        }
    }

    /// Split `text` into literal and `$name$` slices. At most one
    /// interpolation is allowed between two slashes.
    fn interpolation_slices(&self, text: &str, base: usize) -> PResult<Vec<Slice>> {
        let bytes = text.as_bytes();
        let mut slices = Vec::new();
        let mut literal = String::new();
        let mut segment_interpolated = false;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'$' => {
                    let name_start = i + 1;
                    let mut j = name_start;
                    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                        j += 1;
                    }
                    if j == name_start || bytes.get(j) != Some(&b'$') {
                        return Err(self.error_at(
                            ErrorCode::INVALID_INTERPOLATION,
                            "expected an interpolation of the form '$name$'",
                            base + i,
                        ));
                    }
                    if segment_interpolated {
                        return Err(self.error_at(
                            ErrorCode::INVALID_INTERPOLATION,
                            "only one interpolation is allowed between two slashes",
                            base + i,
                        ));
                    }
                    segment_interpolated = true;
                    if !literal.is_empty() {
                        slices.push(Slice::Literal(std::mem::take(&mut literal)));
                    }
                    slices.push(Slice::Interpolation(Ident::new(
                        &text[name_start..j],
                        Span::new(base + name_start, base + j),
                    )));
                    i = j + 1;
                }
                b'/' => {
                    segment_interpolated = false;
                    literal.push('/');
                    i += 1;
                }
                _ => {
                    let c = text[i..].chars().next().unwrap_or_default();
                    literal.push(c);
                    i += c.len_utf8().max(1);
                }
            }
        }
        if !literal.is_empty() {
            slices.push(Slice::Literal(literal));
        }
        Ok(slices)
    }

    // ── URLs ──────────────────────────────────────────────────────────────────

    /// `https://example.com`, `https://*.example.com`,
    /// `https://example.com/index.html`, `https://example.com/api/...`,
    /// `https://example.com/users/$id$`
    pub(crate) fn parse_url_like(&mut self) -> PResult<Node> {
        let start = self.pos;
        self.scan_to_delimiter();
        let text = self.slice(start, self.pos);
        let span = self.span_from(start);

        let host_start = text.find("://").map_or(0, |i| i + 3);
        let rest = &text[host_start..];
        let (host, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };

        let valid_host = !host.is_empty()
            && host
                .bytes()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'.' | b'-' | b':' | b'*'));
        if !valid_host {
            return Err(self.error_at(
                ErrorCode::INVALID_URL,
                format!("invalid host '{host}'"),
                start + host_start,
            ));
        }
        let host_pattern = host.contains('*');

        if path.is_empty() {
            let kind = if host_pattern {
                NodeKind::HostPattern(text.to_string())
            } else {
                NodeKind::Host(text.to_string())
            };
            return Ok(Node::new(kind, span));
        }
        if host_pattern {
            return Err(self.error_at(
                ErrorCode::INVALID_URL,
                "a host pattern cannot have a path",
                start + host_start,
            ));
        }

        let is_glob = path.contains('*');
        if path.contains('$') {
            if is_glob || path.contains("...") {
                return Err(self.error_at(
                    ErrorCode::INVALID_PATTERN,
                    "URL patterns cannot be interpolated",
                    start,
                ));
            }
            let slices = self.interpolation_slices(text, start)?;
            return Ok(Node::new(NodeKind::UrlExpr { slices }, span));
        }

        if let Some(idx) = text.find("...") {
            self.check_prefix_pattern(text, idx, start, &['*'])?;
            return Ok(Node::new(
                NodeKind::UrlPattern {
                    pattern: text.to_string(),
                    prefix: true,
                },
                span,
            ));
        }

        if is_glob {
            return Ok(Node::new(
                NodeKind::UrlPattern {
                    pattern: text.to_string(),
                    prefix: false,
                },
                span,
            ));
        }

        Ok(Node::new(NodeKind::Url(text.to_string()), span))
    }
}
