// src/config/mod.rs
//! Watcher configuration: one `[settings]` table plus `[[feed]]` entries.
//!
//! Secrets (the webhook URL) never live here; they come from the environment.

pub mod feeds;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::state::file::file_stem;

pub use feeds::{
    CommentSelectors, CutoffMode, DateWindowConfig, FeedConfig, ItemFailurePolicy,
    SelectorConfig, Settings,
};

pub const ENV_CONFIG_PATH: &str = "WATCH_CONFIG_PATH";
pub const DEFAULT_CONFIG_TOML: &str = "config/feeds.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/feeds.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedConfig>,
}

impl WatchConfig {
    /// Rejects configs the runtime cannot act on. Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        // keys are compared by the file stem their state lives under
        let mut stems: HashMap<String, &str> = HashMap::new();
        for feed in &self.feeds {
            let key = feed.key.trim();
            if key.is_empty() {
                bail!("feed with base_url {:?} has an empty key", feed.base_url);
            }
            if let Some(first) = stems.insert(file_stem(key), key) {
                if first == key {
                    bail!("duplicate feed key {key:?}");
                }
                bail!(
                    "feed keys {first:?} and {key:?} share state files ({:?})",
                    file_stem(key)
                );
            }
            if feed.base_url.trim().is_empty() {
                bail!("feed {key:?}: base_url is empty");
            }
            if !feed.item_path.is_empty() && !feed.item_path.contains("{id}") {
                bail!("feed {key:?}: item_path {:?} has no {{id}} placeholder", feed.item_path);
            }
            if feed.cutoff_mode == CutoffMode::DateWindow {
                let usable = feed
                    .date_window
                    .as_ref()
                    .is_some_and(|w| w.oldest.is_some() || w.lookback_days.is_some());
                if !usable {
                    bail!("feed {key:?}: cutoff_mode = \"date_window\" needs date_window.oldest or date_window.lookback_days");
                }
            }
            if feed.selectors.row.trim().is_empty() || feed.selectors.title.trim().is_empty() {
                bail!("feed {key:?}: row and title selectors are required");
            }
        }
        Ok(())
    }

    pub fn feed(&self, key: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.key == key)
    }
}

/// Load and validate from an explicit path. TOML or JSON, picked by extension
/// with a fallback to the other format.
pub fn load_config_from(path: &Path) -> Result<WatchConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading watch config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, &ext)
        .with_context(|| format!("parsing watch config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Env var + fallbacks:
/// 1) $WATCH_CONFIG_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
///
/// No file at all yields an empty config.
pub fn load_config_default() -> Result<WatchConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()));
    }
    for candidate in [DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_JSON] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_config_from(&p);
        }
    }
    Ok(WatchConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<WatchConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(Into::into);
    }
    match toml::from_str::<WatchConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) if hint_ext != "toml" => {
            serde_json::from_str(s).map_err(|_| anyhow!(toml_err))
        }
        Err(e) => Err(e.into()),
    }
}
