//! Demo: two cycles against a scripted board, notifications through the
//! configured notifier (log-only without DISCORD_WEBHOOK_URL).

use std::sync::Arc;

use board_watcher::config::{CutoffMode, FeedConfig};
use board_watcher::engine::FeedRunner;
use board_watcher::item::ListingRow;
use board_watcher::notify::notifier_from_env;
use board_watcher::testing::{MemoryStore, ScriptedAdapter};

fn rows(ids: &[u64]) -> Vec<ListingRow> {
    ids.iter()
        .map(|id| {
            ListingRow::new(id.to_string(), format!("Demo post #{id}"))
                .with_category("notice")
                .with_date("2025.06.17")
        })
        .collect()
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let store = Arc::new(MemoryStore::new().with_watermark("demo", 100));
    let notifier = notifier_from_env();
    let feed = FeedConfig::new("demo", "https://example.com").with_cutoff(CutoffMode::Watermark);

    let boards = [rows(&[105, 104, 103, 99, 98]), rows(&[106, 105, 104])];
    for (n, listing) in boards.into_iter().enumerate() {
        let runner = FeedRunner::new(
            feed.clone(),
            Arc::new(ScriptedAdapter::single(listing)),
            store.clone(),
            notifier.clone(),
        );
        match runner.run_cycle().await {
            Ok(r) => println!(
                "cycle {}: delivered {:?}, watermark {:?}",
                n + 1,
                r.delivered,
                store.watermark("demo")
            ),
            Err(e) => println!("cycle {} failed: {e}", n + 1),
        }
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    }

    println!("watch-demo done");
}
