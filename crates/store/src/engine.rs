//! The state engine: pooled connections, per-request transactions, and
//! ordered transactional batches.

use crate::error::StateResult;
use crate::ledger::ResourceLedger;
use crate::ops::Operation;
use crate::records::{Record, RecordStore};
use crate::resolver::TenantResolver;
use silo_core::StoreConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Tenant-aware state store over one PostgreSQL pool.
///
/// Requests run concurrently; each operation takes its own pooled connection
/// and (for writes) its own transaction. An uncommitted transaction rolls
/// back when dropped, which covers both error propagation and cancellation.
#[derive(Debug)]
pub struct StateEngine {
    pool: PgPool,
    resolver: TenantResolver,
    ledger: Arc<ResourceLedger>,
}

impl StateEngine {
    /// Connect the pool and build the engine.
    pub async fn connect(config: &StoreConfig) -> StateResult<Self> {
        tracing::info!(
            tenant_mode = %config.tenant_mode,
            max_connections = config.max_connections,
            "connecting state store pool"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await?;

        Ok(Self {
            pool,
            resolver: TenantResolver::new(config),
            ledger: ResourceLedger::new(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn record_store(&self, metadata: &HashMap<String, String>) -> StateResult<RecordStore> {
        let location = self.resolver.resolve(metadata)?;
        Ok(RecordStore::new(location, Arc::clone(&self.ledger)))
    }

    /// Fetch a record for the tenant named in `metadata`.
    pub async fn get(
        &self,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> StateResult<Option<Record>> {
        let store = self.record_store(metadata)?;
        let mut conn = self.pool.acquire().await?;
        store.get(&mut conn, key).await
    }

    /// Upsert a record in its own transaction.
    pub async fn set(
        &self,
        key: &str,
        value: &[u8],
        etag: Option<&str>,
        ttl_seconds: i64,
        metadata: &HashMap<String, String>,
    ) -> StateResult<()> {
        let store = self.record_store(metadata)?;
        let mut tx = self.pool.begin().await?;
        store.upsert(&mut tx, key, value, etag, ttl_seconds).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a record in its own transaction.
    pub async fn delete(
        &self,
        key: &str,
        etag: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> StateResult<()> {
        let store = self.record_store(metadata)?;
        let mut tx = self.pool.begin().await?;
        store.delete(&mut tx, key, etag).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Apply an ordered batch atomically.
    ///
    /// The whole batch shares one transaction; the first failure propagates
    /// and rolls everything back, so partial application is never observable.
    /// An empty batch opens no transaction at all.
    pub async fn transact(&self, operations: &[Operation], ttl_seconds: i64) -> StateResult<()> {
        if operations.is_empty() {
            debug!("empty transactional batch, nothing to do");
            return Ok(());
        }

        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        for operation in operations {
            let store = self.record_store(operation.metadata())?;
            match operation {
                Operation::Set {
                    key, value, etag, ..
                } => {
                    store
                        .upsert(&mut tx, key, value, etag.as_deref(), ttl_seconds)
                        .await?;
                }
                Operation::Delete { key, etag, .. } => {
                    store.delete(&mut tx, key, etag.as_deref()).await?;
                }
            }
        }
        tx.commit().await?;
        debug!(operations = operations.len(), "transactional batch committed");
        Ok(())
    }
}
