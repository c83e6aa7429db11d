//! Entities that permissions are granted on: paths, URLs, hosts and their
//! patterns.

use std::fmt;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::EntityError;

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

const HOST_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

// ══════════════════════════════════════════════════════════════════════════════
// Paths
// ══════════════════════════════════════════════════════════════════════════════

/// A filesystem path. Absolute paths are lexically normalized on
/// construction; a trailing `/` marks a directory and is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(String);

impl Path {
    pub fn new(path: impl Into<String>) -> Result<Self, EntityError> {
        let path = path.into();
        if path.starts_with('/') {
            Ok(Self(normalize(&path)))
        } else if path.starts_with("./") || path.starts_with("../") {
            Ok(Self(path))
        } else {
            Err(EntityError::InvalidPath(path))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Resolve a relative path against the process working directory.
    pub fn to_absolute(&self) -> Result<Path, EntityError> {
        if self.is_absolute() {
            return Ok(self.clone());
        }
        let cwd = std::env::current_dir().map_err(|e| EntityError::Unresolvable {
            path: self.0.clone(),
            reason: e.to_string(),
        })?;
        let joined = format!("{}/{}", cwd.to_string_lossy(), self.0);
        Ok(Self(normalize(&joined)))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lexically resolve `.` and `..` segments of an absolute path.
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut normalized = format!("/{}", segments.join("/"));
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if trailing && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// `/data/*.json` (glob) or `/data/...` (prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathPattern {
    pattern: String,
    prefix: bool,
}

impl PathPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self, EntityError> {
        let pattern = pattern.into();
        let invalid = |reason: &str| EntityError::InvalidPattern {
            pattern: pattern.clone(),
            reason: reason.to_string(),
        };
        if !pattern.starts_with('/') {
            return Err(invalid("path patterns must be absolute"));
        }
        if let Some(base) = pattern.strip_suffix("...") {
            if !base.ends_with('/') || base.contains("...") {
                return Err(invalid("'...' is only allowed at the end, after a '/'"));
            }
            if base.contains(['*', '?', '[']) {
                return Err(invalid("a prefix pattern cannot contain glob characters"));
            }
            return Ok(Self {
                pattern,
                prefix: true,
            });
        }
        if pattern.contains("...") {
            return Err(invalid("'...' is only allowed at the end, after a '/'"));
        }
        Pattern::new(&pattern).map_err(|e| invalid(e.msg))?;
        Ok(Self {
            pattern,
            prefix: false,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    /// The literal part every matched path starts with.
    fn literal_prefix(&self) -> &str {
        if self.prefix {
            &self.pattern[..self.pattern.len() - 3]
        } else {
            let end = self.pattern.find(['*', '?', '[']).unwrap_or(self.pattern.len());
            &self.pattern[..end]
        }
    }

    pub fn test(&self, path: &Path) -> bool {
        if self.prefix {
            return path.as_str().starts_with(self.literal_prefix());
        }
        Pattern::new(&self.pattern).is_ok_and(|p| p.matches_with(path.as_str(), PATH_MATCH))
    }

    /// Whether every path matched by `other` is matched by `self`.
    pub fn includes(&self, other: &PathPattern) -> bool {
        self == other || (self.prefix && other.literal_prefix().starts_with(self.literal_prefix()))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// URLs & Hosts
// ══════════════════════════════════════════════════════════════════════════════

/// Split `scheme://host/path` into its three parts; the path keeps its
/// leading `/`.
fn split_url(url: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let valid_host = !host.is_empty()
        && host
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'.' | b'-' | b':' | b'*'));
    valid_host.then_some((scheme, host, path))
}

/// Split a URL path from its query and fragment.
fn split_query(path: &str) -> (&str, &str) {
    path.split_at(path.find(['?', '#']).unwrap_or(path.len()))
}

/// `Some(false)` for `.`, `Some(true)` for `..`, including their
/// percent-encoded spellings.
fn dot_segment(segment: &str) -> Option<bool> {
    let single = |s: &str| s == "." || s.eq_ignore_ascii_case("%2e");
    if single(segment) {
        return Some(false);
    }
    let parent = ["..", ".%2e", "%2e.", "%2e%2e"]
        .iter()
        .any(|form| segment.eq_ignore_ascii_case(form));
    parent.then_some(true)
}

/// Resolve the dot-segments of a URL path the way HTTP clients do before
/// sending the request. Empty segments are kept.
fn normalize_url_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut segments: Vec<&str> = Vec::new();
    let mut parts = path[1..].split('/').peekable();
    while let Some(segment) = parts.next() {
        let last = parts.peek().is_none();
        match dot_segment(segment) {
            Some(parent) => {
                if parent {
                    segments.pop();
                }
                if last {
                    segments.push("");
                }
            }
            None => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// `https://example.com/index.html`. The path is normalized on construction,
/// so `https://example.com/a/../b` is stored as `https://example.com/b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Url(String);

impl Url {
    pub fn new(url: impl Into<String>) -> Result<Self, EntityError> {
        let url = url.into();
        let normalized = match split_url(&url) {
            Some((scheme, host, path)) if !host.contains('*') => {
                let (path, rest) = split_query(path);
                (!path.contains('\\'))
                    .then(|| format!("{scheme}://{host}{}{rest}", normalize_url_path(path)))
            }
            _ => None,
        };
        normalized.map(Self).ok_or(EntityError::InvalidUrl(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `https://example.com` for `https://example.com/index.html`.
    pub fn host(&self) -> Host {
        match split_url(&self.0) {
            Some((scheme, host, _)) => Host(format!("{scheme}://{host}")),
            None => Host(self.0.clone()),
        }
    }

    /// The path, with a leading `/`; empty when the URL has none.
    pub fn path(&self) -> &str {
        split_url(&self.0).map_or("", |(_, _, path)| path)
    }
}

impl TryFrom<String> for Url {
    type Error = EntityError;

    fn try_from(url: String) -> Result<Self, EntityError> {
        Self::new(url)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `https://example.com`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host(String);

impl Host {
    pub fn new(host: impl Into<String>) -> Result<Self, EntityError> {
        let host = host.into();
        match split_url(&host) {
            Some((_, name, "")) if !name.contains('*') => Ok(Self(host)),
            _ => Err(EntityError::InvalidHost(host)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once("://").map_or("", |(scheme, _)| scheme)
    }

    /// The host name without the scheme.
    pub fn name(&self) -> &str {
        self.0.split_once("://").map_or(&self.0, |(_, name)| name)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `https://example.com/api/...` (prefix) or `https://example.com/*.json` (glob).
/// Only `*` is special in URL globs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UrlPattern {
    pattern: String,
    prefix: bool,
}

impl UrlPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self, EntityError> {
        let pattern = pattern.into();
        let invalid = |reason: &str| EntityError::InvalidPattern {
            pattern: pattern.clone(),
            reason: reason.to_string(),
        };
        let Some((_, host, path)) = split_url(&pattern) else {
            return Err(EntityError::InvalidUrl(pattern));
        };
        if host.contains('*') {
            return Err(invalid("the host of a URL pattern cannot contain '*'"));
        }
        if path.is_empty() {
            return Err(invalid("a URL pattern needs a path"));
        }
        let (segments, _) = split_query(path);
        if segments.contains('\\') || segments.split('/').any(|s| dot_segment(s).is_some()) {
            return Err(invalid("a URL pattern cannot contain '.' or '..' segments"));
        }
        if let Some(base) = pattern.strip_suffix("...") {
            if !base.ends_with('/') || base.contains("...") {
                return Err(invalid("'...' is only allowed at the end, after a '/'"));
            }
            if base.contains('*') {
                return Err(invalid("a prefix pattern cannot contain '*'"));
            }
            return Ok(Self {
                pattern,
                prefix: true,
            });
        }
        if pattern.contains("...") {
            return Err(invalid("'...' is only allowed at the end, after a '/'"));
        }
        if !pattern.contains('*') {
            return Err(invalid("a URL pattern is either a prefix or contains '*'"));
        }
        Ok(Self {
            pattern,
            prefix: false,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn host(&self) -> Host {
        match split_url(&self.pattern) {
            Some((scheme, host, _)) => Host(format!("{scheme}://{host}")),
            None => Host(self.pattern.clone()),
        }
    }

    fn literal_prefix(&self) -> &str {
        if self.prefix {
            &self.pattern[..self.pattern.len() - 3]
        } else {
            let end = self.pattern.find('*').unwrap_or(self.pattern.len());
            &self.pattern[..end]
        }
    }

    /// The pattern as a glob, with everything but `*` escaped.
    fn glob(&self) -> Option<Pattern> {
        let escaped: Vec<String> = self.pattern.split('*').map(Pattern::escape).collect();
        Pattern::new(&escaped.join("*")).ok()
    }

    pub fn test(&self, url: &Url) -> bool {
        if self.prefix {
            return url.as_str().starts_with(self.literal_prefix());
        }
        self.glob().is_some_and(|p| p.matches_with(url.as_str(), PATH_MATCH))
    }

    pub fn includes(&self, other: &UrlPattern) -> bool {
        self == other || (self.prefix && other.literal_prefix().starts_with(self.literal_prefix()))
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// `https://*.example.com`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPattern(String);

impl HostPattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self, EntityError> {
        let pattern = pattern.into();
        match split_url(&pattern) {
            Some((_, name, "")) if name.contains('*') => Ok(Self(pattern)),
            _ => Err(EntityError::InvalidPattern {
                pattern,
                reason: "a host pattern is a scheme and a host containing '*'".into(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Matches hosts with the same scheme whose name matches the pattern.
    pub fn test(&self, host: &Host) -> bool {
        let Some((scheme, name)) = self.0.split_once("://") else {
            return false;
        };
        scheme == host.scheme()
            && Pattern::new(name).is_ok_and(|p| p.matches_with(host.name(), HOST_MATCH))
    }

    pub fn test_url(&self, url: &Url) -> bool {
        self.test(&url.host())
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Path {
        Path::new(s).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::new(s).unwrap()
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(path("/a/./b/../c").as_str(), "/a/c");
        assert_eq!(path("/a/b/").as_str(), "/a/b/");
        assert_eq!(path("/../..").as_str(), "/");
        assert_eq!(path("./x").as_str(), "./x");
        assert!(Path::new("x").is_err());
    }

    #[test]
    fn test_relative_path_resolution() {
        let abs = path("./x/../y").to_absolute().unwrap();
        assert!(abs.is_absolute());
        assert!(abs.as_str().ends_with("/y"));
    }

    #[test]
    fn test_prefix_pattern() {
        let p = PathPattern::new("/a/...").unwrap();
        assert!(p.is_prefix());
        assert!(p.test(&path("/a/b/c")));
        assert!(p.test(&path("/a/")));
        assert!(!p.test(&path("/b")));
        assert!(!p.test(&path("/ab")));
        assert!(!p.test(&path("/a/../etc/passwd")));
    }

    #[test]
    fn test_glob_pattern() {
        let p = PathPattern::new("/data/*.json").unwrap();
        assert!(p.test(&path("/data/a.json")));
        assert!(!p.test(&path("/data/sub/a.json")));
        assert!(!p.test(&path("/data/a.txt")));
    }

    #[test]
    fn test_invalid_path_patterns() {
        assert!(PathPattern::new("/data/.../").is_err());
        assert!(PathPattern::new("/data/*/...").is_err());
        assert!(PathPattern::new("data/*").is_err());
        assert!(PathPattern::new("/data/[").is_err());
    }

    #[test]
    fn test_pattern_inclusion() {
        let wide = PathPattern::new("/a/...").unwrap();
        let narrow = PathPattern::new("/a/b/...").unwrap();
        let glob = PathPattern::new("/a/b/*.txt").unwrap();
        assert!(wide.includes(&narrow));
        assert!(wide.includes(&glob));
        assert!(!narrow.includes(&wide));
        assert!(glob.includes(&glob.clone()));
    }

    #[test]
    fn test_url_parts() {
        let u = url("https://example.com/a/b?q=1");
        assert_eq!(u.host(), Host::new("https://example.com").unwrap());
        assert_eq!(u.path(), "/a/b?q=1");
        assert!(Url::new("ftp://example.com/x").is_err());
        assert!(Url::new("https://*.example.com/x").is_err());
        assert!(Host::new("https://example.com/x").is_err());
    }

    #[test]
    fn test_url_dot_segments_are_resolved() {
        assert_eq!(url("https://example.com/api/../admin/secrets").path(), "/admin/secrets");
        assert_eq!(url("https://example.com/api/%2e%2E/admin").path(), "/admin");
        assert_eq!(url("https://example.com/a/./b/.").path(), "/a/b/");
        assert_eq!(url("https://example.com/a/..").path(), "/");
        assert_eq!(url("https://example.com/../../x").path(), "/x");
        assert_eq!(url("https://example.com/a//b?next=/../x").path(), "/a//b?next=/../x");
        assert_eq!(url("https://example.com").as_str(), "https://example.com");
        assert!(Url::new("https://example.com/api/..\\admin").is_err());
    }

    #[test]
    fn test_url_pattern_rejects_dot_segments() {
        assert!(UrlPattern::new("https://example.com/api/../...").is_err());
        assert!(UrlPattern::new("https://example.com/%2E/*.json").is_err());
        assert!(UrlPattern::new("https://example.com/api/...").is_ok());
    }

    #[test]
    fn test_deserialized_url_is_normalized() {
        let u: Url = serde_json::from_str(r#""https://example.com/a/../b""#).unwrap();
        assert_eq!(u.path(), "/b");
        assert!(serde_json::from_str::<Url>(r#""ftp://example.com/""#).is_err());
    }

    #[test]
    fn test_host_pattern() {
        let p = HostPattern::new("https://*.example.com").unwrap();
        assert!(p.test_url(&url("https://api.example.com/x")));
        assert!(!p.test_url(&url("https://example.com/x")));
        assert!(!p.test_url(&url("http://api.example.com/x")));
    }

    #[test]
    fn test_url_patterns() {
        let prefix = UrlPattern::new("https://example.com/api/...").unwrap();
        assert!(prefix.test(&url("https://example.com/api/users")));
        assert!(!prefix.test(&url("https://example.com/other")));

        let glob = UrlPattern::new("https://example.com/*.json?v=1").unwrap();
        assert!(glob.test(&url("https://example.com/data.json?v=1")));
        assert!(!glob.test(&url("https://example.com/data.json?v=2")));
        assert!(!glob.test(&url("https://example.com/a/data.json?v=1")));
    }
}
