//! board-watcher: binary entrypoint.
//! Loads the feed config, then runs every feed once (`interval_secs = 0`) or
//! on a fixed period until Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};
use board_watcher::config::load_config_default;
use board_watcher::ingest::scheduler::{build_runners, run_all_once, spawn_all};
use board_watcher::notify::notifier_from_env;
use board_watcher::telemetry::{
    ensure_metrics_described, init_tracing, install_exporter, metrics_addr_from_env,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Some(addr) = metrics_addr_from_env()? {
        install_exporter(addr)?;
    }
    ensure_metrics_described();

    let cfg = load_config_default().context("loading watch config")?;
    if cfg.feeds.is_empty() {
        tracing::warn!("no feeds configured; nothing to do");
        return Ok(());
    }

    let notifier = notifier_from_env();
    tracing::info!(feeds = cfg.feeds.len(), notifier = notifier.name(), "board-watcher starting");
    let runners = build_runners(&cfg, notifier)?;

    if cfg.settings.interval_secs == 0 {
        let results = run_all_once(&runners).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        tracing::info!(feeds = results.len(), failed, "single pass done");
        return Ok(());
    }

    let handles = spawn_all(&runners, Duration::from_secs(cfg.settings.interval_secs));
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    for h in handles {
        h.abort();
    }
    Ok(())
}
