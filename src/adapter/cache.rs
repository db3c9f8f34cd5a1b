//! TTL-bounded response cache keyed by request fingerprint.
//!
//! Two calls that optimize to the same prompt against the same model and
//! sampling settings hash to the same [`Fingerprint`] and share one backend
//! invocation until the entry expires. Expiry is lazy: entries are dropped
//! when a lookup finds them stale, or in bulk via [`ResponseCache::sweep`].

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::llm::CompletionRequest;

/// Content hash identifying one completion request.
///
/// Covers the final prompt, model name, temperature and token limit. Two
/// requests differing in any of these never collide on purpose; temperature
/// is rounded to four decimal places so float formatting noise does not
/// split otherwise identical requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a fully resolved completion request.
    pub fn of(request: &CompletionRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(format!("{:.4}", request.temperature).as_bytes());
        hasher.update([0u8]);
        match request.max_tokens {
            Some(limit) => hasher.update(limit.to_le_bytes()),
            None => hasher.update(b"unbounded"),
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct CacheEntry {
    output: String,
    created_at: Instant,
}

/// Hit and miss counters plus current occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// In-memory completion cache with a single time-to-live for all entries.
pub struct ResponseCache {
    entries: HashMap<Fingerprint, CacheEntry>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a cached completion, dropping the entry if it has expired.
    pub fn get(&mut self, key: &Fingerprint) -> Option<String> {
        let expired = matches!(
            self.entries.get(key),
            Some(entry) if entry.created_at.elapsed() >= self.ttl
        );
        if expired {
            self.entries.remove(key);
        }
        if let Some(entry) = self.entries.get(key) {
            self.hits += 1;
            return Some(entry.output.clone());
        }
        self.misses += 1;
        None
    }

    /// Store a completion, replacing any previous entry for the same key.
    pub fn insert(&mut self, key: Fingerprint, output: String) {
        self.entries.insert(
            key,
            CacheEntry {
                output,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry and return how many were removed.
    pub fn sweep(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
