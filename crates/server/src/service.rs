//! The state store service dispatched into by the host.

use crate::api::{
    DeleteRequest, FEATURES, GetRequest, GetResponse, SetRequest, StateStore, TransactOperation,
    TransactRequest, TransactionalStateStore,
};
use crate::sweeper::ExpirySweeper;
use async_trait::async_trait;
use silo_core::StoreConfig;
use silo_store::{Operation, StateEngine, StateError, StateResult};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request metadata key carrying the TTL in seconds.
pub const TTL_METADATA_KEY: &str = "ttlInSeconds";

/// Adapter from the host contract onto the state engine.
#[derive(Debug)]
pub struct StateStoreService {
    instance_id: String,
    engine: StateEngine,
}

impl StateStoreService {
    /// Initialize a store instance from the host's component properties.
    pub async fn init(
        instance_id: impl Into<String>,
        properties: &HashMap<String, String>,
        sweeper: &ExpirySweeper,
    ) -> StateResult<Self> {
        let config = StoreConfig::from_properties(properties)?;
        Self::with_config(instance_id.into(), config, sweeper).await
    }

    /// Initialize from an already-parsed configuration.
    ///
    /// Registers with the sweeper and blocks until the shared tenant
    /// registry exists, so first-use provisioning never races the registry
    /// DDL. The wait is bounded: a process configured without a running
    /// sweeper fails startup instead of hanging.
    pub async fn with_config(
        instance_id: String,
        config: StoreConfig,
        sweeper: &ExpirySweeper,
    ) -> StateResult<Self> {
        let ready = sweeper.register(&instance_id, &config.connection_string).await;
        let timeout = Duration::from_secs(config.handshake_timeout_secs);
        match tokio::time::timeout(timeout, ready).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(StateError::Config(
                    "sweeper dropped this registration before establishing the shared registry"
                        .to_string(),
                ));
            }
            Err(_) => {
                return Err(StateError::Config(format!(
                    "shared tenant registry was not established within {}s; \
                     is the expiry sweeper running?",
                    config.handshake_timeout_secs
                )));
            }
        }

        let engine = StateEngine::connect(&config).await?;
        info!(instance_id = %instance_id, "state store initialized");
        Ok(Self {
            instance_id,
            engine,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn engine(&self) -> &StateEngine {
        &self.engine
    }

    fn ttl_from_metadata(metadata: &HashMap<String, String>) -> StateResult<i64> {
        match metadata.get(TTL_METADATA_KEY) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StateError::InvalidTtl(raw.clone())),
            None => Ok(0),
        }
    }
}

/// An empty etag means "unconditional", same as no etag at all.
fn normalize_etag(etag: Option<String>) -> Option<String> {
    etag.filter(|tag| !tag.is_empty())
}

#[async_trait]
impl StateStore for StateStoreService {
    async fn get(&self, request: GetRequest) -> StateResult<Option<GetResponse>> {
        debug!(instance_id = %self.instance_id, key = %request.key, "get");
        match self.engine.get(&request.key, &request.metadata).await {
            Ok(Some(record)) => Ok(Some(GetResponse {
                data: record.value,
                etag: Some(record.etag),
            })),
            Ok(None) => Ok(None),
            // A tenant that has never written has no table yet; that reads
            // as absent, not as an error.
            Err(StateError::ResourceMissing(object)) => {
                debug!(object = %object, key = %request.key, "storage object not provisioned, state not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn set(&self, request: SetRequest) -> StateResult<()> {
        debug!(instance_id = %self.instance_id, key = %request.key, "set");
        let ttl = Self::ttl_from_metadata(&request.metadata)?;
        let etag = normalize_etag(request.etag);
        self.engine
            .set(
                &request.key,
                &request.value,
                etag.as_deref(),
                ttl,
                &request.metadata,
            )
            .await
    }

    async fn delete(&self, request: DeleteRequest) -> StateResult<()> {
        debug!(instance_id = %self.instance_id, key = %request.key, "delete");
        let etag = normalize_etag(request.etag);
        self.engine
            .delete(&request.key, etag.as_deref(), &request.metadata)
            .await
    }

    fn features(&self) -> &'static [&'static str] {
        info!(instance_id = %self.instance_id, features = ?FEATURES, "registering state store features");
        &FEATURES
    }
}

#[async_trait]
impl TransactionalStateStore for StateStoreService {
    async fn transact(&self, request: TransactRequest) -> StateResult<()> {
        debug!(
            instance_id = %self.instance_id,
            operations = request.operations.len(),
            "transact"
        );
        let ttl = Self::ttl_from_metadata(&request.metadata)?;
        let operations: Vec<Operation> = request
            .operations
            .into_iter()
            .map(|operation| match operation {
                TransactOperation::Set(set) => Operation::Set {
                    key: set.key,
                    value: set.value,
                    etag: normalize_etag(set.etag),
                    metadata: set.metadata,
                },
                TransactOperation::Delete(delete) => Operation::Delete {
                    key: delete.key,
                    etag: normalize_etag(delete.etag),
                    metadata: delete.metadata,
                },
            })
            .collect();
        self.engine.transact(&operations, ttl).await
    }
}
