//! Transactional operation types.

use std::collections::HashMap;

/// One sub-operation of a transactional batch, applied in order.
///
/// Each operation carries its own metadata map and resolves its own tenant;
/// the batch-level TTL applies to every `Set` in the batch.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Insert or update a key, honoring the same etag semantics as a single
    /// set.
    Set {
        key: String,
        value: Vec<u8>,
        etag: Option<String>,
        metadata: HashMap<String, String>,
    },
    /// Delete a key, conditionally when an etag is supplied.
    Delete {
        key: String,
        etag: Option<String>,
        metadata: HashMap<String, String>,
    },
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        match self {
            Self::Set { metadata, .. } | Self::Delete { metadata, .. } => metadata,
        }
    }
}
