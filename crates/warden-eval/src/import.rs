//! Fetching, verifying and caching imported module text.
//!
//! Every import names the SHA-256 of the module it expects. Text whose hash
//! does not match is rejected before it reaches the parser. Verified text is
//! kept in a small LRU cache keyed by URL and checksum.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use warden_context::Url;

use crate::config::RuntimeConfig;
use crate::error::{EvalError, EvalResult};

/// Source of module text.
pub trait ModuleFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected content type {0}")]
    ContentType(String),
    #[error("cannot read response: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches modules over HTTP(S).
pub struct HttpFetcher {
    agent: ureq::Agent,
    content_type: String,
}

impl HttpFetcher {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(config.http_timeout())
                .build(),
            content_type: config.import_content_type.clone(),
        }
    }
}

impl ModuleFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .agent
            .get(url.as_str())
            .set("Accept", &self.content_type)
            .call()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        if response.content_type() != self.content_type {
            return Err(FetchError::ContentType(response.content_type().to_string()));
        }
        Ok(response.into_string()?)
    }
}

/// Lowercase hex SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn verify_checksum(text: &str, expected: &str) -> Result<(), String> {
    let actual = sha256_hex(text);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(format!("checksum mismatch: expected {expected}, got {actual}"))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Cache
// ══════════════════════════════════════════════════════════════════════════════

struct ModuleCache {
    capacity: usize,
    /// Least recently used first.
    entries: VecDeque<(String, Arc<str>)>,
}

impl ModuleCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<Arc<str>> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(index)?;
        let text = Arc::clone(&entry.1);
        self.entries.push_back(entry);
        Some(text)
    }

    fn insert(&mut self, key: String, text: Arc<str>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|(k, _)| *k != key);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, text));
    }
}

/// Loads module text through a [`ModuleFetcher`], verifying checksums.
pub struct Importer {
    fetcher: Box<dyn ModuleFetcher>,
    cache: Mutex<ModuleCache>,
}

impl Importer {
    pub fn new(fetcher: Box<dyn ModuleFetcher>, cache_capacity: usize) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(ModuleCache::new(cache_capacity)),
        }
    }

    /// Module text at `url`, which must hash to `checksum`.
    pub fn load(&self, url: &Url, checksum: &str) -> EvalResult<Arc<str>> {
        let key = format!("{url}#{}", checksum.trim().to_ascii_lowercase());
        if let Some(text) = self.cache.lock().get(&key) {
            debug!(%url, "module cache hit");
            return Ok(text);
        }

        debug!(%url, "fetching module");
        let import_error = |reason: String| EvalError::Import {
            url: url.to_string(),
            reason,
        };
        let text = self
            .fetcher
            .fetch(url)
            .map_err(|e| import_error(e.to_string()))?;
        verify_checksum(&text, checksum).map_err(import_error)?;

        let text: Arc<str> = Arc::from(text);
        self.cache.lock().insert(key, Arc::clone(&text));
        Ok(text)
    }

    /// Number of cached modules.
    pub fn cached(&self) -> usize {
        self.cache.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    struct Counting {
        text: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl ModuleFetcher for Counting {
        fn fetch(&self, _url: &Url) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    fn url(u: &str) -> Url {
        Url::new(u).unwrap()
    }

    #[test]
    fn known_digests() {
        assert_eq!(sha256_hex(""), EMPTY_SHA256);
        assert_eq!(sha256_hex("abc"), ABC_SHA256);
    }

    #[test]
    fn checksum_is_case_insensitive() {
        assert!(verify_checksum("abc", &ABC_SHA256.to_uppercase()).is_ok());
        assert!(verify_checksum("abd", ABC_SHA256).is_err());
    }

    #[test]
    fn verified_text_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let importer = Importer::new(
            Box::new(Counting { text: "abc", calls: Arc::clone(&calls) }),
            4,
        );
        let u = url("https://example.com/lib.wd");
        assert_eq!(&*importer.load(&u, ABC_SHA256).unwrap(), "abc");
        assert_eq!(&*importer.load(&u, ABC_SHA256).unwrap(), "abc");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(importer.cached(), 1);
    }

    #[test]
    fn mismatch_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let importer = Importer::new(
            Box::new(Counting { text: "abc", calls: Arc::clone(&calls) }),
            4,
        );
        let err = importer
            .load(&url("https://example.com/lib.wd"), EMPTY_SHA256)
            .unwrap_err();
        assert!(matches!(err, EvalError::Import { ref reason, .. } if reason.contains("checksum")));
        assert_eq!(importer.cached(), 0);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let mut cache = ModuleCache::new(2);
        cache.insert("a".into(), Arc::from("1"));
        cache.insert("b".into(), Arc::from("2"));
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), Arc::from("3"));
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }
}
