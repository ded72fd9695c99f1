use std::sync::Arc;

use tracing::{error, info};

use pool_sync::api::health::HealthState;
use pool_sync::api::latency::LatencyStats;
use pool_sync::api::routes::{router, ApiState};
use pool_sync::bootstrap::BootstrapOutcome;
use pool_sync::config::Config;
use pool_sync::connections::{ConnectionSettings, Connections};
use pool_sync::error::Result;
use pool_sync::scheduler::Scheduler;
use pool_sync::telemetry::init_logging;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = match init_logging(&cfg) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Logging setup failed for {}: {e}", cfg.log_file);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
    info!("Shutdown complete");
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        provider = %cfg.provider_url,
        interval_secs = cfg.sync_interval_secs,
        "Starting pool sync service",
    );

    let conns = Arc::new(Connections::new(ConnectionSettings::from(&cfg)));
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    let scheduler = Arc::new(Scheduler::new(
        cfg.clone(),
        Arc::clone(&conns),
        Arc::clone(&health),
        Arc::clone(&latency),
    )?);

    // --- Connections, schema, cache bootstrap ---
    match scheduler.start().await? {
        BootstrapOutcome::Skipped => info!("Cache already warm"),
        BootstrapOutcome::Loaded { records, report } => info!(
            "Cache bootstrapped from {records} records ({} applied, {} failed)",
            report.applied, report.failed,
        ),
    }

    // --- HTTP API server ---
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            conns.close().await;
            return Err(e.into());
        }
    };
    info!("HTTP API listening on {bind_addr}");

    let app = router(ApiState { conns: Arc::clone(&conns), health, latency });
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP API stopped: {e}");
        }
    });

    // --- Sync loop until a shutdown signal ---
    scheduler.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
