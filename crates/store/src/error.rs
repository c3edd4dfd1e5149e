//! State store error types.

use thiserror::Error;

/// SQLSTATE for "relation does not exist".
const UNDEFINED_TABLE: &str = "42P01";

/// State store operation errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Startup-fatal configuration problem; never raised per request.
    #[error("configuration error: {0}")]
    Config(String),

    /// The per-request metadata carried no usable tenant id.
    #[error("missing tenant id: 'metadata.tenantId' is a mandatory property")]
    MissingTenantId,

    /// The caller-supplied etag is not a valid version token.
    #[error("invalid etag: not a valid version token")]
    EtagInvalid,

    /// The supplied etag did not match the row's current version, or the row
    /// is absent or expired.
    #[error("etag mismatch: state was modified or removed")]
    EtagMismatch,

    /// The caller-supplied TTL metadata does not parse as integer seconds.
    #[error("invalid ttlInSeconds value: '{0}'")]
    InvalidTtl(String),

    /// A storage object this operation relies on does not exist (yet). The
    /// caller may retry; the gate will re-provision on the next write.
    #[error("missing storage object: {0}")]
    ResourceMissing(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StateError {
    /// True when a database failure reports an undefined relation, i.e. a
    /// tenant schema or table that is not (or no longer) present.
    pub fn is_missing_relation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_TABLE),
            _ => false,
        }
    }
}

impl From<silo_core::ConfigError> for StateError {
    fn from(err: silo_core::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for state store operations.
pub type StateResult<T> = std::result::Result<T, StateError>;
