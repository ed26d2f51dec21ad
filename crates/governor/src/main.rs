//! Fleet governor - container fleet retention daemon
//!
//! Classifies running containers into retention tiers every monitoring
//! period, evicts whatever exceeds each tier's capacity, records the cycle
//! into SQLite and periodically triggers container provisioning.

use anyhow::{Context, Result};
use clap::Parser;
use governor_lib::{
    config::FleetConfig,
    health::{components, HealthRegistry},
    observability::{FleetLogger, FleetMetrics},
    provision::{run_hooks, CommandProvisioner},
    runtime::DockerCli,
    scheduler::{FleetOwner, Scheduler},
    store::MetricsStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;

const GOVERNOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "fleet-governor")]
#[command(version, about = "Container fleet retention governor")]
struct Args {
    /// Configuration file (TOML, YAML or JSON); FLEET_* variables override it
    #[arg(short, long, env = "FLEET_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting fleet-governor");

    let config = FleetConfig::load(args.config.as_deref())?;
    info!(
        node_name = %config.node_name,
        database = %config.database_path.display(),
        low_capacity = config.low_capacity,
        high_capacity = config.high_capacity,
        max_governed = config.max_governed,
        "Governor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = FleetMetrics::new();
    let logger = FleetLogger::new(&config.node_name);

    // Without a store there is nothing to record into
    let store = match MetricsStore::open(&config.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Failed to open metrics store");
            return Err(e).context("opening metrics store");
        }
    };
    logger.log_startup(GOVERNOR_VERSION, &config.database_path.display().to_string());

    let failed_hooks = run_hooks("startup", &config.startup_hooks, config.command_timeout()).await;
    if failed_hooks > 0 {
        warn!(failed = failed_hooks, "Some startup hooks failed");
    }

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let runtime = Arc::new(DockerCli::new(
        config.runtime_binary.clone(),
        config.command_timeout(),
    ));
    let provisioner = Arc::new(CommandProvisioner::new(
        config.provision_command.clone(),
        config.command_timeout(),
    ));
    let owner = FleetOwner::new(
        &config,
        runtime,
        store,
        provisioner,
        health_registry.clone(),
    );
    let scheduler = Scheduler::new(&config, owner).start();

    // Mark governor as ready once the scheduler is running
    health_registry.set_ready(true).await;

    let reason = shutdown_signal().await?;
    health_registry.set_ready(false).await;
    logger.log_shutdown(reason);

    match scheduler.shutdown().await {
        Ok(report) => info!(
            removed = report.removed,
            failed = report.failed,
            hooks_failed = report.hooks_failed,
            "Teardown finished"
        ),
        Err(e) => {
            error!(error = %e, "Scheduler did not stop cleanly");
            health_registry
                .set_unhealthy(components::GOVERNOR, e.to_string())
                .await;
        }
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for SIGINT")?;
            Ok("SIGINT received")
        }
        _ = terminate.recv() => Ok("SIGTERM received"),
    }
}
