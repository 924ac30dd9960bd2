//! Memoizing cache for expensive external calls.
//!
//! [`Cache::memoize`] wraps an operation identified by a logical name and
//! keys its result by a SHA-256 fingerprint of the serialized arguments.
//! Values live in a [`KvStore`] with a time-to-live; the in-process
//! [`MemoryStore`] is the default, and a distributed store can be plugged
//! in through the trait.
//!
//! The cache is strictly an optimization: store failures and undecodable
//! entries are logged and treated as misses, and only successful results
//! are stored. Concurrent misses on the same key both execute and the last
//! write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the value stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// Entry count at which a write first sweeps out expired entries.
const DEFAULT_PURGE_THRESHOLD: usize = 1024;

/// In-process [`KvStore`] backed by a `HashMap`.
///
/// Expired entries are dropped lazily on read, by
/// [`MemoryStore::purge_expired`], and by any write that finds the map at
/// its purge mark. After each sweep the mark moves to twice the surviving
/// entry count (never below the threshold), so the map stays within a
/// constant factor of its live entries.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
    purge_threshold: usize,
    purge_mark: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_purge_threshold(DEFAULT_PURGE_THRESHOLD)
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose writes sweep expired entries once it
    /// holds `threshold` entries.
    #[must_use]
    pub fn with_purge_threshold(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            entries: RwLock::new(HashMap::new()),
            purge_threshold: threshold,
            purge_mark: AtomicUsize::new(threshold),
        }
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut entries, now)
    }

    fn sweep(&self, entries: &mut HashMap<String, StoredValue>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, v| v.expires_at > now);
        self.purge_mark.store(
            entries.len().saturating_mul(2).max(self.purge_threshold),
            Ordering::Relaxed,
        );
        before - entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let entry = StoredValue {
            value,
            expires_at: now + ttl,
        };
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), entry);
        if entries.len() >= self.purge_mark.load(Ordering::Relaxed) {
            let purged = self.sweep(&mut entries, now);
            debug!(purged, remaining = entries.len(), "swept expired cache entries");
        }
        Ok(())
    }
}

/// Memoizer over a shared [`KvStore`].
#[derive(Clone)]
pub struct Cache {
    store: Option<Arc<dyn KvStore>>,
    ttl: Duration,
    namespace: String,
}

impl Cache {
    /// Creates a cache over `store` with a default time-to-live.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
            namespace: "deepsearch".to_string(),
        }
    }

    /// Creates a cache over a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), ttl)
    }

    /// Creates a cache that always invokes the operation.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
            namespace: "deepsearch".to_string(),
        }
    }

    /// Sets the key namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Returns `true` when a backing store is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Computes the storage key for `operation` applied to `args`.
    pub fn fingerprint<A>(&self, operation: &str, args: &A) -> Result<String, CacheError>
    where
        A: Serialize + ?Sized,
    {
        let encoded = serde_json::to_string(args)?;
        let digest = Sha256::digest(encoded.as_bytes());
        Ok(format!("{}:{operation}:{digest:x}", self.namespace))
    }

    /// Returns the cached result of `operation(args)` or computes, stores
    /// and returns it.
    ///
    /// Only `Ok` results are stored. Cache failures never fail the call.
    pub async fn memoize<A, T, E, F, Fut>(&self, operation: &str, args: &A, f: F) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(store) = self.store.as_ref() else {
            return f().await;
        };

        let key = match self.fingerprint(operation, args) {
            Ok(key) => key,
            Err(e) => {
                warn!(operation, error = %e, "cache fingerprint failed, bypassing cache");
                return f().await;
            }
        };

        match store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(operation, key, "cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(operation, key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => debug!(operation, key, "cache miss"),
            Err(e) => warn!(operation, key, error = %e, "cache read failed"),
        }

        let value = f().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = store.set(&key, raw, self.ttl).await {
                    warn!(operation, key, error = %e, "cache write failed");
                }
            }
            Err(e) => warn!(operation, key, error = %e, "cache value not serializable"),
        }

        Ok(value)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("enabled", &self.is_enabled())
            .field("ttl", &self.ttl)
            .field("namespace", &self.namespace)
            .finish()
    }
}
