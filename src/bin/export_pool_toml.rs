//! One-shot export of cached pools into the router's pool.toml (`POOL_TOML_PATH`).

use std::path::Path;

use tracing::{error, info};

use pool_sync::config::Config;
use pool_sync::connections::{ConnectionSettings, Connections};
use pool_sync::error::Result;
use pool_sync::pool_toml::export_pool_toml;
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

    let conns = Connections::new(ConnectionSettings::from(&cfg));
    let result = export(&conns, &cfg).await;
    conns.close().await;

    if let Err(e) = result {
        error!("Pool config export failed: {e}");
        std::process::exit(1);
    }
}

async fn export(conns: &Connections, cfg: &Config) -> Result<()> {
    conns.initialize().await?;
    info!("Connections initialized");

    let cache = conns.cache()?;
    let report = export_pool_toml(cache.as_ref(), Path::new(&cfg.pool_toml_path)).await?;
    info!(
        keys = report.keys_scanned,
        added = report.mints_added,
        merged = report.mints_merged,
        skipped_pools = report.skipped_pools,
        written = report.written,
        "Export finished",
    );
    Ok(())
}
