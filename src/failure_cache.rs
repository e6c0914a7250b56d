// src/failure_cache.rs

//! Negative cache of recently failed remote URLs
//!
//! Resolution attempts record every transport failure here so that later
//! attempts can skip a known-bad URL without touching the network. Entries
//! expire after a fixed window and are evicted lazily on read; a
//! successful fetch of the same URL evicts eagerly.
//!
//! The cache is shared across concurrent resolutions and requires no
//! external locking by callers.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default expiry window for failure entries (one hour)
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(3600);

/// Time-bounded negative cache keyed by URL
#[derive(Debug)]
pub struct UrlFailureCache {
    entries: DashMap<String, Instant>,
    expiry: Duration,
}

impl UrlFailureCache {
    /// Create a cache with the default expiry window
    pub fn new() -> Self {
        Self::with_expiry(DEFAULT_EXPIRY)
    }

    /// Create a cache with a custom expiry window
    pub fn with_expiry(expiry: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            expiry,
        }
    }

    /// Record a failed fetch, overwriting any previous entry for the URL
    pub fn record_failure(&self, url: &str) {
        debug!("recording failed url {}", url);
        self.entries.insert(url.to_string(), Instant::now());
    }

    /// True iff the URL failed within the expiry window
    ///
    /// Stale entries are treated as absent and removed lazily.
    pub fn has_failed(&self, url: &str) -> bool {
        if let Some(entry) = self.entries.get(url)
            && entry.elapsed() < self.expiry
        {
            return true;
        }
        // Absent, or present but stale: evict the stale entry.
        self.entries
            .remove_if(url, |_, recorded| recorded.elapsed() >= self.expiry);
        false
    }

    /// Remove the entry for a URL, called after a successful fetch
    pub fn clear_failure(&self, url: &str) {
        if self.entries.remove(url).is_some() {
            debug!("cleared failed url {}", url);
        }
    }

    /// Number of entries currently held, including stale ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UrlFailureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://repo.example.com/g/a/1.0/a-1.0.jar";

    #[test]
    fn test_unknown_url_has_not_failed() {
        let cache = UrlFailureCache::new();
        assert!(!cache.has_failed(URL));
    }

    #[test]
    fn test_record_then_has_failed() {
        let cache = UrlFailureCache::new();
        cache.record_failure(URL);
        assert!(cache.has_failed(URL));
    }

    #[test]
    fn test_record_twice_is_idempotent() {
        let cache = UrlFailureCache::new();
        cache.record_failure(URL);
        cache.record_failure(URL);
        assert!(cache.has_failed(URL));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_failure_evicts() {
        let cache = UrlFailureCache::new();
        cache.record_failure(URL);
        cache.clear_failure(URL);
        assert!(!cache.has_failed(URL));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_entry_expires_lazily() {
        let cache = UrlFailureCache::with_expiry(Duration::from_millis(20));
        cache.record_failure(URL);
        assert!(cache.has_failed(URL));

        std::thread::sleep(Duration::from_millis(40));

        assert!(!cache.has_failed(URL));
        // The stale entry was removed on read.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_distinct_urls_independent() {
        let cache = UrlFailureCache::new();
        cache.record_failure(URL);
        assert!(!cache.has_failed("https://other.example.com/a.jar"));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;

        let cache = Arc::new(UrlFailureCache::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                let url = format!("https://repo.example.com/artifact-{}.jar", i % 4);
                for _ in 0..100 {
                    cache.record_failure(&url);
                    let _ = cache.has_failed(&url);
                    cache.clear_failure(&url);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
