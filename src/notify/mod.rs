pub mod discord;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::item::ItemDescriptor;

pub use discord::DiscordNotifier;

/// One new post, ready to be pushed to a chat channel.
#[derive(Debug, Clone)]
pub struct Notification {
    pub feed: String,
    pub item: ItemDescriptor,
    pub item_url: String,
    pub feed_url: String,
    /// Human label for the feed ("notice", "update"); falls back to the item category.
    pub category: String,
    pub artifact: Option<PathBuf>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Used when no webhook is configured: the notification only goes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notify",
            feed = n.feed.as_str(),
            item_id = %n.item.id,
            category = n.category.as_str(),
            url = n.item_url.as_str(),
            "new post: {}",
            n.item.title
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Discord when `DISCORD_WEBHOOK_URL` is set, log-only otherwise.
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match std::env::var("DISCORD_WEBHOOK_URL") {
        Ok(url) if !url.trim().is_empty() => Arc::new(DiscordNotifier::new(url.trim().to_string())),
        _ => {
            tracing::debug!("Discord disabled (no DISCORD_WEBHOOK_URL)");
            Arc::new(LogNotifier)
        }
    }
}
