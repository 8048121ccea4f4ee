//! Bounded, TTL-aware response cache.
//!
//! Stores successful responses for idempotent requests so repeated calls skip
//! the transport round trip entirely. Expiry is lazy (checked on read) and
//! eviction is least-recently-inserted when the store exceeds its capacity.

mod cache_key;

pub use cache_key::CacheKey;

use crate::config::CacheConfig;
use crate::types::{Request, Response};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

struct CacheEntry {
    response: Response,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Bounded TTL key/value store for successful responses.
///
/// Eviction policy is least-recently-inserted (FIFO by insertion order);
/// overwriting an existing key keeps its original insertion slot.
pub struct ResponseCache {
    capacity: usize,
    default_ttl: Duration,
    inner: RwLock<CacheInner>,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    insertion_order: VecDeque<CacheKey>,
}

impl ResponseCache {
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            capacity: config.capacity,
            default_ttl: config.default_ttl,
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    /// Look up a response. Returns `None` if never stored or expired; an
    /// expired entry is removed on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<Response> {
        let now = Instant::now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    let mut response = entry.response.clone();
                    response.from_cache = true;
                    response.attempt_count = 0;
                    response.elapsed = Duration::ZERO;
                    return Some(response);
                }
                Some(_) => {}
            }
        }
        // Expired: drop it under the write lock, re-checking first since
        // another writer may have replaced it meanwhile.
        let mut inner = self.inner.write();
        if inner
            .entries
            .get(key)
            .map_or(false, |entry| entry.is_expired(now))
        {
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
        }
        None
    }

    /// Store a response under the key, overwriting any existing entry.
    ///
    /// Only 2xx responses for idempotent, non-opted-out requests belong here;
    /// the pipeline enforces that gate via [`ResponseCache::admits`].
    pub fn put(&self, key: CacheKey, response: Response, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if self.capacity == 0 || ttl.is_zero() {
            return;
        }
        let mut inner = self.inner.write();
        let replaced = inner
            .entries
            .insert(
                key.clone(),
                CacheEntry {
                    response,
                    inserted_at: Instant::now(),
                    ttl,
                },
            )
            .is_some();
        if !replaced {
            inner.insertion_order.push_back(key);
            while inner.entries.len() > self.capacity {
                if let Some(oldest) = inner.insertion_order.pop_front() {
                    inner.entries.remove(&oldest);
                    tracing::debug!(key = %oldest, "evicted least-recently-inserted cache entry");
                } else {
                    break;
                }
            }
        }
    }

    /// Whether the request/response pair is admissible to the cache.
    pub fn admits(request: &Request, response: &Response) -> bool {
        request.is_idempotent() && !request.cache_opt_out() && response.status.is_success()
    }

    /// Number of live-or-expired entries currently held.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
