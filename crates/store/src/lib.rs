//! Multi-tenant PostgreSQL state-store engine.
//!
//! This crate provides the data plane behind the host-facing state store:
//! - Tenant resolution: per-request metadata → concrete (schema, table)
//! - A process-local resource ledger gating first-use provisioning
//! - Conditional get/upsert/delete with xmin-based etags and TTL expiry
//! - Ordered transactional batches over one connection
//! - The shared tenant registry consulted by the expiry sweeper

pub mod engine;
pub mod error;
pub mod ledger;
pub mod ops;
pub mod records;
pub mod registry;
pub mod resolver;

pub use engine::StateEngine;
pub use error::{StateError, StateResult};
pub use ledger::{ResourceClaim, ResourceLedger};
pub use ops::Operation;
pub use records::{Record, RecordStore};
pub use resolver::{Location, TENANT_ID_KEY, TenantResolver};
