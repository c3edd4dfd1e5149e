//! silod — multi-tenant PostgreSQL state store daemon.
//!
//! Wires configuration, the expiry sweeper, and a state store instance
//! together, then waits for shutdown. The host transport mounts on top of
//! [`silo_server::StateStore`].

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use silo_core::AppConfig;
use silo_server::api::StateStore;
use silo_server::{ExpirySweeper, StateStoreService};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// silo - a multi-tenant PostgreSQL state store
#[derive(Parser, Debug)]
#[command(name = "silod")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SILO_CONFIG", default_value = "config/silod.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("silod v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SILO_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(&config.sweeper);
    let sweeper_handle = tokio::spawn(sweeper.clone().run(shutdown_rx));

    let instance_id = uuid::Uuid::new_v4().to_string();
    let store = StateStoreService::with_config(instance_id, config.store, &sweeper)
        .await
        .context("failed to initialize state store")?;
    tracing::info!(features = ?store.features(), "state store ready for host dispatch");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    Ok(())
}
