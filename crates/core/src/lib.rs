//! Shared configuration types for the silo state store.
//!
//! This crate holds the startup-time model:
//! - Tenant mode and per-instance store configuration
//! - Sweeper and daemon configuration for `silod`
//! - Parsing of the host's component property map

pub mod config;
pub mod error;

pub use config::{AppConfig, StoreConfig, SweeperConfig, TenantMode};
pub use error::ConfigError;
