//! Configuration error types.

use thiserror::Error;

/// Startup-fatal configuration errors.
///
/// These are raised while a component instance is being constructed, before
/// any request is served.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mandatory '{0}' property not specified")]
    MissingProperty(&'static str),

    #[error("unsupported 'tenant' property value '{0}': use 'schema' or 'table'")]
    InvalidTenantMode(String),

    #[error("invalid value for '{key}': {message}")]
    InvalidProperty { key: &'static str, message: String },
}
