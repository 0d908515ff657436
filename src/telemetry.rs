// src/telemetry.rs
//! Logging and metrics setup shared by the binaries.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";
pub const ENV_LOG_JSON: &str = "WATCH_LOG_JSON";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watch_cycles_total", "Cycles started, per feed.");
        describe_counter!(
            "watch_cycle_failures_total",
            "Cycles that ended before PERSIST."
        );
        describe_counter!(
            "watch_items_accepted_total",
            "Items accepted by the listing scanner."
        );
        describe_counter!(
            "watch_items_delivered_total",
            "Items whose notification was sent."
        );
        describe_counter!(
            "watch_item_failures_total",
            "Detail or notify failures inside the item loop."
        );
        describe_counter!("watch_notify_errors_total", "Notifier errors.");
        describe_counter!("watch_pages_fetched_total", "Listing pages fetched.");
        describe_counter!(
            "watch_fetch_errors_total",
            "HTTP fetches that failed after retries."
        );
        describe_gauge!(
            "watch_last_cycle_ts",
            "Unix ts of the last completed cycle, per feed."
        );
    });
}

/// Compact logs by default, JSON lines with `WATCH_LOG_JSON=1`.
/// Filter comes from `RUST_LOG`, falling back to `board_watcher=info,warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("board_watcher=info,notify=info,warn"));

    let json = std::env::var(ENV_LOG_JSON)
        .ok()
        .is_some_and(|v| v == "1");

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Serve Prometheus metrics on `addr` (`/metrics`). Needs a running tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing prometheus exporter on {addr}"))?;
    ensure_metrics_described();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

/// `METRICS_ADDR` parsed, if set and non-empty.
pub fn metrics_addr_from_env() -> Result<Option<SocketAddr>> {
    match std::env::var(ENV_METRICS_ADDR) {
        Ok(v) if !v.trim().is_empty() => {
            let addr = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_METRICS_ADDR}={v:?} is not a socket address"))?;
            Ok(Some(addr))
        }
        _ => Ok(None),
    }
}
