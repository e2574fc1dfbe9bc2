//! Content-addressed verdict cache.
//!
//! Keyed by the SHA-256 of the primary document's bytes: a byte-identical
//! re-upload reuses the earlier model verdict instead of paying for a
//! second call. Entries expire after a TTL.
//!
//! [`MemoryVerdictCache`] is the in-process store, bounded with FIFO
//! eviction. [`TieredCache`] layers a shared store over a local fallback
//! for multi-instance deployments; a failing shared tier is logged and
//! skipped, never surfaced to the verifier.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use caduceus_contracts::{
    document::CacheEntry,
    error::{CaduceusError, CaduceusResult},
};

/// Hex SHA-256 digest of a document's bytes; the cache key.
pub fn document_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Point-in-time cache occupancy, reported on the operational surface.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub size: usize,
    pub capacity: usize,
    pub ttl_hours: i64,
}

/// Storage behind the AI verdict cache.
///
/// Implementations must treat writes as idempotent: the same document hash
/// always maps to the same verdict, so a lost update under a write race is
/// tolerable.
#[async_trait]
pub trait VerdictCache: Send + Sync {
    /// Fetch a live entry; `None` on miss or expiry.
    async fn get(&self, document_hash: &str) -> CaduceusResult<Option<CacheEntry>>;

    /// Store an entry under the document hash.
    async fn put(&self, document_hash: &str, entry: CacheEntry) -> CaduceusResult<()>;

    async fn stats(&self) -> CacheStats;
}

// ── In-process store ──────────────────────────────────────────────────────────

/// Bounded in-process verdict cache with FIFO eviction.
pub struct MemoryVerdictCache {
    inner: Mutex<MemoryInner>,
    capacity: usize,
    ttl: Duration,
}

struct MemoryInner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order; drives eviction once `capacity` is reached.
    order: VecDeque<String>,
}

impl MemoryVerdictCache {
    pub fn new(capacity: usize, ttl_hours: i64) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// 1000 entries, 24 hour TTL.
    pub fn with_defaults() -> Self {
        Self::new(1000, 24)
    }

    fn lock(&self) -> CaduceusResult<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner.lock().map_err(|e| CaduceusError::CacheUnavailable {
            reason: format!("verdict cache lock poisoned: {e}"),
        })
    }
}

#[async_trait]
impl VerdictCache for MemoryVerdictCache {
    async fn get(&self, document_hash: &str) -> CaduceusResult<Option<CacheEntry>> {
        let mut inner = self.lock()?;
        let expired = match inner.entries.get(document_hash) {
            Some(entry) if entry.is_expired(self.ttl) => true,
            Some(entry) => {
                debug!(hash = &document_hash[..12.min(document_hash.len())], "cache hit");
                return Ok(Some(entry.clone()));
            }
            None => return Ok(None),
        };
        if expired {
            // Stale order entries are tolerated; eviction skips keys that
            // are no longer present.
            inner.entries.remove(document_hash);
            debug!(hash = &document_hash[..12.min(document_hash.len())], "cache entry expired");
        }
        Ok(None)
    }

    async fn put(&self, document_hash: &str, entry: CacheEntry) -> CaduceusResult<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut inner = self.lock()?;
        if inner.entries.contains_key(document_hash) {
            inner.entries.insert(document_hash.to_string(), entry);
            return Ok(());
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(document_hash.to_string());
        inner.entries.insert(document_hash.to_string(), entry);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let size = self.lock().map(|inner| inner.entries.len()).unwrap_or(0);
        CacheStats {
            backend: "memory",
            size,
            capacity: self.capacity,
            ttl_hours: self.ttl.num_hours(),
        }
    }
}

// ── Tiered combinator ─────────────────────────────────────────────────────────

/// Shared store first, local fallback on shared-store failure.
///
/// A shared-tier error is logged and absorbed; this type never returns
/// `Err` from `get` or `put`. Note that a shared-tier *miss* is answered as
/// a miss without consulting the local tier; the local store only serves
/// while the shared one is failing.
pub struct TieredCache {
    shared: Arc<dyn VerdictCache>,
    local: Arc<dyn VerdictCache>,
}

impl TieredCache {
    pub fn new(shared: Arc<dyn VerdictCache>, local: Arc<dyn VerdictCache>) -> Self {
        Self { shared, local }
    }
}

#[async_trait]
impl VerdictCache for TieredCache {
    async fn get(&self, document_hash: &str) -> CaduceusResult<Option<CacheEntry>> {
        match self.shared.get(document_hash).await {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!(error = %err, "shared cache read failed, falling back to local");
                match self.local.get(document_hash).await {
                    Ok(found) => Ok(found),
                    Err(err) => {
                        warn!(error = %err, "local cache read failed, treating as miss");
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn put(&self, document_hash: &str, entry: CacheEntry) -> CaduceusResult<()> {
        match self.shared.put(document_hash, entry.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "shared cache write failed, falling back to local");
                if let Err(err) = self.local.put(document_hash, entry).await {
                    warn!(error = %err, "local cache write failed, dropping entry");
                }
                Ok(())
            }
        }
    }

    async fn stats(&self) -> CacheStats {
        self.shared.stats().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
