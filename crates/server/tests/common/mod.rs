//! Shared PostgreSQL test harness.
//!
//! Each harness boots a disposable Postgres container, spawns a fast-ticking
//! sweeper, and initializes a store instance through the real registry
//! handshake. Requires Docker; set SKIP_POSTGRES_TESTS=1 to skip.

use silo_core::{StoreConfig, SweeperConfig, TenantMode};
use silo_server::{ExpirySweeper, StateStoreService};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::watch;

/// Stable prefix for Docker/container startup failures in test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

pub struct TestHarness {
    pub service: Arc<StateStoreService>,
    #[allow(dead_code)]
    pub sweeper: Arc<ExpirySweeper>,
    pub url: String,
    shutdown: watch::Sender<bool>,
    _container: ContainerAsync<Postgres>,
}

impl TestHarness {
    pub async fn new(mode: TenantMode) -> Result<Self, String> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|err| format!("{CONTAINER_START_ERR_PREFIX} {err}"))?;

        let host = container
            .get_host()
            .await
            .map_err(|err| format!("failed to get container host: {err}"))?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .map_err(|err| format!("failed to get container port: {err}"))?;
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

        let sweeper = ExpirySweeper::new(&SweeperConfig { interval_secs: 1 });
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(Arc::clone(&sweeper).run(shutdown_rx));

        let config = StoreConfig::for_testing(&url, mode);
        let service = StateStoreService::with_config("test-instance".to_string(), config, &sweeper)
            .await
            .map_err(|err| format!("store initialization failed: {err}"))?;

        Ok(Self {
            service: Arc::new(service),
            sweeper,
            url,
            shutdown,
            _container: container,
        })
    }

    /// Open a raw pool for physical-layout assertions.
    pub async fn raw_pool(&self) -> PgPool {
        PgPool::connect(&self.url)
            .await
            .expect("failed to open raw inspection pool")
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Try to create a harness, skipping if Docker is unavailable or
/// SKIP_POSTGRES_TESTS is set.
///
/// Only container-start failures cause a skip; handshake, schema, or
/// connection errors still panic so real regressions are not silently
/// swallowed.
pub async fn harness_or_skip(mode: TenantMode) -> Option<TestHarness> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match TestHarness::new(mode).await {
        Ok(harness) => Some(harness),
        Err(message) => {
            if message.contains(CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {message}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {message}");
            }
        }
    }
}

/// Request metadata for a tenant.
pub fn metadata(tenant_id: &str) -> HashMap<String, String> {
    HashMap::from([("tenantId".to_string(), tenant_id.to_string())])
}

/// Request metadata for a tenant with a TTL.
pub fn metadata_with_ttl(tenant_id: &str, ttl_seconds: i64) -> HashMap<String, String> {
    let mut map = metadata(tenant_id);
    map.insert("ttlInSeconds".to_string(), ttl_seconds.to_string());
    map
}
