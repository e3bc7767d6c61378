//! In-memory response cache.
//!
//! Entries are keyed by a request fingerprint and expire after a TTL. An
//! expired entry is treated as absent and removed on the read that finds it.

use gateway_core::{CompletionRequest, CompletionResponse};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct ResponseCacheConfig {
    /// Lifetime of an entry
    pub ttl: Duration,
    /// Maximum live entries before eviction
    pub max_entries: usize,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

impl ResponseCacheConfig {
    /// Set the default TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the capacity
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }
}

#[derive(Debug)]
struct CacheEntry {
    response: CompletionResponse,
    expires_at: Instant,
    /// Insertion order; lower is older
    seq: u64,
}

impl CacheEntry {
    fn new(response: CompletionResponse, ttl: Duration, seq: u64) -> Self {
        Self {
            response,
            expires_at: Instant::now() + ttl,
            seq,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    /// Live and expired-but-unswept entries
    pub entries: usize,
    /// Lookups that returned a value
    pub hits: u64,
    /// Lookups that returned nothing
    pub misses: u64,
}

/// TTL-keyed store of recent completions
#[derive(Debug)]
pub struct ResponseCache {
    config: ResponseCacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(ResponseCacheConfig::default())
    }
}

impl ResponseCache {
    /// Create a cache
    #[must_use]
    pub fn new(config: ResponseCacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache with a given TTL and default capacity
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(ResponseCacheConfig::default().with_ttl(ttl))
    }

    /// Default entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Live entry for `key`, if any
    pub fn get(&self, key: &str) -> Option<CompletionResponse> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.response.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: another writer may have refreshed it in between
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            debug!(key = %key, "Cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a response with an explicit TTL
    pub fn put(&self, key: impl Into<String>, response: CompletionResponse, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            Self::evict(&mut entries, self.config.max_entries);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(key, CacheEntry::new(response, ttl, seq));
    }

    /// Store a response with the default TTL
    pub fn insert(&self, key: impl Into<String>, response: CompletionResponse) {
        self.put(key, response, self.config.ttl);
    }

    /// Drop an entry
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Make room for one entry: expired first, then oldest inserted
    fn evict(entries: &mut HashMap<String, CacheEntry>, max_entries: usize) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));

        if entries.len() >= max_entries {
            let to_remove = entries.len() - max_entries + 1;
            let mut by_age: Vec<(u64, String)> = entries
                .iter()
                .map(|(k, v)| (v.seq, k.clone()))
                .collect();
            by_age.sort_unstable();

            for (_, key) in by_age.into_iter().take(to_remove) {
                debug!(key = %key, "Cache entry evicted");
                entries.remove(&key);
            }
        }
    }
}

/// Deterministic cache key for a resolved request.
///
/// Covers agent id, model, temperature, token limit and the ordered messages.
/// Every field is length-prefixed so distinct requests cannot collide by
/// concatenation.
#[must_use]
pub fn request_fingerprint(request: &CompletionRequest) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, request.agent_id.as_bytes());
    field(&mut hasher, request.model_or_empty().as_bytes());
    field(
        &mut hasher,
        &request.temperature.map_or(u32::MAX, f32::to_bits).to_le_bytes(),
    );
    field(&mut hasher, &request.max_tokens.unwrap_or(0).to_le_bytes());
    for message in &request.messages {
        field(&mut hasher, message.role.as_str().as_bytes());
        field(&mut hasher, message.content.as_bytes());
    }
    hex::encode(hasher.finalize())
}
