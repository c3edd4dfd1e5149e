//! Resource ledger and provisioning gate.
//!
//! `CREATE ... IF NOT EXISTS` is not concurrency-safe on the backing store
//! under heavy parallel cold starts (existence checks are eventual, not
//! linearizable with concurrent creators). The ledger converts "maybe exists"
//! into a per-process single-writer guarantee: the first caller for a given
//! resource key runs the provisioning DDL under a per-key lock, everyone else
//! waits for the ledger entry. Correctness is scoped to one process instance;
//! across instances the idempotent DDL remains the second line of defense.

use crate::error::StateResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

/// Process-local registry of storage objects believed to exist.
///
/// An entry means "this schema/table has been provisioned"; entries are
/// removed (not re-validated) when a write discovers the object missing.
/// Growth is unbounded by tenant count, an explicitly accepted risk.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: Mutex<HashMap<String, OffsetDateTime>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Handle for rolling a ledger entry back when a later operation discovers
/// the storage object is actually absent, forcing re-provisioning on the
/// next use.
#[derive(Clone)]
pub struct ResourceClaim {
    ledger: Arc<ResourceLedger>,
    key: String,
}

impl ResourceClaim {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the ledger entry so the next caller re-provisions.
    pub async fn invalidate(&self) {
        self.ledger.forget(&self.key).await;
        debug!(resource = %self.key, "ledger entry invalidated");
    }
}

impl ResourceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ensure the resource behind `key` exists, invoking `provision` at most
    /// once per process while the entry is live.
    ///
    /// Fast path: a ledger hit returns without any locking or DDL. Otherwise
    /// the per-key lock is taken, the ledger re-checked (a racing caller may
    /// have provisioned while we waited), and only then is `provision` run.
    /// Contention is scoped to one resource key, bounded by the time of one
    /// provisioning round trip.
    pub async fn ensure_exists<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        provision: F,
    ) -> StateResult<ResourceClaim>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StateResult<()>>,
    {
        let claim = ResourceClaim {
            ledger: Arc::clone(self),
            key: key.to_string(),
        };

        if self.contains(key).await {
            return Ok(claim);
        }

        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        if self.contains(key).await {
            return Ok(claim);
        }

        provision().await?;
        self.record(key).await;
        debug!(resource = %key, "storage object provisioned");

        Ok(claim)
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    async fn record(&self, key: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), OffsetDateTime::now_utc());
    }

    async fn forget(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
