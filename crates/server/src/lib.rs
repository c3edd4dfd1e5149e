//! Host-facing state store service, expiry sweeper, and process wiring.
//!
//! The host plugin framework dispatches get/set/delete/transact requests
//! into [`StateStoreService`] through the traits in [`api`]; the wire
//! transport between host and process lives with the host, not here.

pub mod api;
pub mod service;
pub mod sweeper;

pub use api::{
    DeleteRequest, FEATURES, GetRequest, GetResponse, SetRequest, StateStore, TransactOperation,
    TransactRequest, TransactionalStateStore,
};
pub use service::StateStoreService;
pub use sweeper::ExpirySweeper;
