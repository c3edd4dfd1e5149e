//! Host-facing state store contract.
//!
//! Request and response shapes mirror the pluggable-component host boundary:
//! every request carries a per-call metadata map holding at least the tenant
//! id, values are opaque bytes, and etags are optional strings.

use async_trait::async_trait;
use silo_store::StateResult;
use std::collections::HashMap;

/// Features advertised to the host.
pub const FEATURES: [&str; 2] = ["ETAG", "TRANSACTIONAL"];

#[derive(Clone, Debug, Default)]
pub struct GetRequest {
    pub key: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct GetResponse {
    pub data: Vec<u8>,
    pub etag: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SetRequest {
    pub key: String,
    pub value: Vec<u8>,
    /// Absent or empty means "unconditional, overwrite whatever is present".
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteRequest {
    pub key: String,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// One sub-operation of a transactional request, applied in order.
#[derive(Clone, Debug)]
pub enum TransactOperation {
    Set(SetRequest),
    Delete(DeleteRequest),
}

#[derive(Clone, Debug, Default)]
pub struct TransactRequest {
    pub operations: Vec<TransactOperation>,
    /// Batch-level metadata; supplies the TTL shared by every set in the
    /// batch.
    pub metadata: HashMap<String, String>,
}

/// The host's state store dispatch surface.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a value; `None` covers both absent and expired records.
    async fn get(&self, request: GetRequest) -> StateResult<Option<GetResponse>>;

    async fn set(&self, request: SetRequest) -> StateResult<()>;

    async fn delete(&self, request: DeleteRequest) -> StateResult<()>;

    /// Capabilities reported to the host.
    fn features(&self) -> &'static [&'static str] {
        &FEATURES
    }
}

/// Transactional extension of [`StateStore`].
#[async_trait]
pub trait TransactionalStateStore: StateStore {
    /// Apply an ordered batch atomically; all or nothing.
    async fn transact(&self, request: TransactRequest) -> StateResult<()>;
}
