//! Expired data cleanup service.
//!
//! One background loop per process. On its first productive pass it creates
//! the shared tenant registry (idempotent DDL) and fires the readiness
//! signal every registered store instance is waiting on; from then on, each
//! tick sweeps the single least-recently-swept tenant per registered backing
//! store and stamps it, keeping coverage fair instead of starving
//! recently-swept tenants.

use silo_core::SweeperConfig;
use silo_store::registry;
use silo_store::{StateError, StateResult};
use sqlx::{Connection, PgConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{debug, info, warn};

struct Registration {
    connection_string: String,
    ready: Option<oneshot::Sender<()>>,
}

/// Background service owning the shared tenant registry and TTL purging.
pub struct ExpirySweeper {
    interval: Duration,
    registrations: Mutex<HashMap<String, Registration>>,
    registry_established: AtomicBool,
    sequence: AtomicU64,
}

impl ExpirySweeper {
    pub fn new(config: &SweeperConfig) -> Arc<Self> {
        Arc::new(Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            registrations: Mutex::new(HashMap::new()),
            registry_established: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        })
    }

    /// Register a store instance.
    ///
    /// The returned receiver resolves once the shared registry exists; store
    /// initialization waits on it (with a timeout) before serving requests,
    /// so no tenant registers into a registry that is not yet created.
    pub async fn register(&self, instance_id: &str, connection_string: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut registrations = self.registrations.lock().await;
        registrations.insert(
            instance_id.to_string(),
            Registration {
                connection_string: connection_string.to_string(),
                ready: Some(tx),
            },
        );
        debug!(instance_id, "state store instance registered for sweeping");
        rx
    }

    /// Run until the shutdown signal flips to `true` (or its sender drops).
    ///
    /// The first pass runs immediately. A failed pass is logged and the loop
    /// continues on the next tick; one bad tenant must not halt sweeping for
    /// all tenants.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper running");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        warn!(error = %err, "sweep pass failed, continuing on next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("expiry sweeper stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One sweep pass over every distinct registered backing store.
    ///
    /// An empty registration set is a no-op, not an error. Failures are
    /// isolated per backing store.
    pub async fn sweep_once(&self) -> StateResult<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let targets: Vec<String> = {
            let registrations = self.registrations.lock().await;
            if registrations.is_empty() {
                info!(sequence, "no state store instances registered yet");
                return Ok(());
            }
            let mut targets: Vec<String> = registrations
                .values()
                .map(|registration| registration.connection_string.clone())
                .collect();
            targets.sort();
            targets.dedup();
            targets
        };

        for connection_string in &targets {
            if let Err(err) = self.sweep_target(connection_string).await {
                warn!(sequence, error = %err, "sweep failed for one backing store");
            }
        }
        Ok(())
    }

    async fn sweep_target(&self, connection_string: &str) -> StateResult<()> {
        let mut conn = PgConnection::connect(connection_string).await?;

        if !self.registry_established.load(Ordering::Acquire) {
            registry::create_registry(&mut conn).await?;
            self.registry_established.store(true, Ordering::Release);
            info!("shared tenant registry established");
        }

        // Registry exists: unblock every store initialization still waiting.
        self.release_waiters().await;

        match registry::next_sweep_candidate(&mut conn).await? {
            None => {
                debug!("tenant registry is empty, nothing to sweep");
            }
            Some(tenant) => {
                match registry::purge_expired(&mut conn, &tenant.tenant_key).await {
                    Ok(purged) => {
                        info!(tenant = %tenant.tenant_key, purged, "sweep pass complete");
                    }
                    Err(StateError::ResourceMissing(_)) => {
                        // Table vanished out from under its registry row; stamp
                        // anyway so the rotation keeps moving.
                        warn!(tenant = %tenant.tenant_key, "tenant table missing during sweep");
                    }
                    Err(err) => return Err(err),
                }
                registry::mark_swept(&mut conn, &tenant.tenant_key).await?;
            }
        }

        let _ = conn.close().await;
        Ok(())
    }

    async fn release_waiters(&self) {
        let mut registrations = self.registrations.lock().await;
        for registration in registrations.values_mut() {
            if let Some(ready) = registration.ready.take() {
                // The waiter may have timed out and dropped its receiver.
                let _ = ready.send(());
            }
        }
    }
}
