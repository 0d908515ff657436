// src/config/feeds.rs
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::Deserialize;

use crate::ingest::retry::RetryPolicy;
use crate::ingest::scanner::{DateWindow, ListingOrder};
use crate::item::ItemId;

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_max_pages() -> u32 {
    5
}
fn default_max_retries() -> u32 {
    2
}
fn default_sleep_ms() -> u64 {
    1000
}
fn default_artifact_keep() -> usize {
    10
}
fn default_history_limit() -> usize {
    200
}

/// Process-wide settings (`[settings]` table).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Scheduler period. `0` runs every feed once and exits.
    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Headless browser used for screenshots; capture is off without it.
    #[serde(default)]
    pub browser_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            output_dir: default_output_dir(),
            interval_secs: 0,
            user_agent: default_user_agent(),
            request_timeout_secs: default_timeout_secs(),
            browser_path: None,
        }
    }
}

/// How a feed decides what is new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffMode {
    /// Stop scanning at the last processed id.
    #[default]
    Watermark,
    /// Read the whole listing, filter against the notified-id set.
    NotifiedSet,
    /// Read a date range, filter against the notified-id set.
    DateWindow,
}

/// What a failed detail fetch or notify does to the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
    /// Log and continue; PERSIST still runs.
    #[default]
    Skip,
    /// Fail the cycle; nothing is persisted.
    Abort,
}

/// Either fixed days or a lookback from today. `newest` defaults to today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DateWindowConfig {
    #[serde(default)]
    pub oldest: Option<NaiveDate>,
    #[serde(default)]
    pub newest: Option<NaiveDate>,
    #[serde(default)]
    pub lookback_days: Option<u64>,
}

impl DateWindowConfig {
    pub fn resolve(&self, today: NaiveDate) -> Option<DateWindow> {
        let newest = self.newest.unwrap_or(today);
        let oldest = match (self.oldest, self.lookback_days) {
            (Some(d), _) => d,
            (None, Some(n)) => newest.checked_sub_days(Days::new(n))?,
            (None, None) => return None,
        };
        (oldest <= newest).then_some(DateWindow { oldest, newest })
    }
}

fn default_row_selector() -> String {
    ".list_area[data-mm-boardlist] li.item[data-mm-listitem]".to_string()
}
fn default_id_attr() -> String {
    "data-threadid".to_string()
}
fn default_title_selector() -> String {
    ".title span".to_string()
}
fn default_date_selector() -> Option<String> {
    Some(".date span".to_string())
}
fn default_category_selector() -> Option<String> {
    Some(".type span".to_string())
}
fn default_body_selector() -> String {
    ".view_body_wrap .content_area .content[data-blockcontent]".to_string()
}

/// CSS selectors for one board layout. Defaults match the game-portal boards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_row_selector")]
    pub row: String,
    /// Row attribute carrying the thread id.
    #[serde(default = "default_id_attr")]
    pub id_attr: String,
    /// Read the id from this child's text instead of `id_attr`.
    #[serde(default)]
    pub id_selector: Option<String>,
    #[serde(default = "default_title_selector")]
    pub title: String,
    #[serde(default = "default_date_selector")]
    pub date: Option<String>,
    #[serde(default = "default_category_selector")]
    pub category: Option<String>,
    #[serde(default = "default_body_selector")]
    pub body: String,
    /// Event run time (`start ~ end`) on the listing row. Ended events are not sent.
    #[serde(default)]
    pub period: Option<String>,
    /// Comment blocks on the detail page; off when absent.
    #[serde(default)]
    pub comments: Option<CommentSelectors>,
}

/// Where comments sit on a detail page. Selectors are relative to `row`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentSelectors {
    pub row: String,
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            row: default_row_selector(),
            id_attr: default_id_attr(),
            id_selector: None,
            title: default_title_selector(),
            date: default_date_selector(),
            category: default_category_selector(),
            body: default_body_selector(),
            period: None,
            comments: None,
        }
    }
}

/// One watched board (`[[feed]]` entry).
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub key: String,
    pub base_url: String,
    #[serde(default)]
    pub listing_path: String,
    /// Detail path relative to `base_url`; `{id}` is replaced with the thread id.
    /// Empty means `{listing_path}/{id}`.
    #[serde(default)]
    pub item_path: String,
    /// Query parameter carrying the page number; absent for single-page boards.
    #[serde(default)]
    pub page_param: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_sleep_ms")]
    pub sleep_interval_ms: u64,
    #[serde(default)]
    pub cutoff_mode: CutoffMode,
    #[serde(default)]
    pub date_window: Option<DateWindowConfig>,
    #[serde(default)]
    pub item_failure_policy: ItemFailurePolicy,
    #[serde(default)]
    pub listing_order: ListingOrder,
    #[serde(default)]
    pub capture_artifacts: bool,
    #[serde(default = "default_artifact_keep")]
    pub artifact_keep: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Label shown in notifications; falls back to the item's own category.
    #[serde(default)]
    pub category_label: Option<String>,
    /// Rows whose category matches one of these are dropped (pinned notices, ads).
    #[serde(default)]
    pub skip_categories: Vec<String>,
    #[serde(default)]
    pub selectors: SelectorConfig,
    /// Write the raw first listing page next to the state files.
    #[serde(default)]
    pub debug_dump: bool,
}

impl FeedConfig {
    pub fn new(key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            base_url: base_url.into(),
            listing_path: String::new(),
            item_path: String::new(),
            page_param: None,
            max_pages: default_max_pages(),
            max_retries: default_max_retries(),
            sleep_interval_ms: default_sleep_ms(),
            cutoff_mode: CutoffMode::default(),
            date_window: None,
            item_failure_policy: ItemFailurePolicy::default(),
            listing_order: ListingOrder::default(),
            capture_artifacts: false,
            artifact_keep: default_artifact_keep(),
            history_limit: default_history_limit(),
            category_label: None,
            skip_categories: Vec::new(),
            selectors: SelectorConfig::default(),
            debug_dump: false,
        }
    }

    pub fn with_cutoff(mut self, mode: CutoffMode) -> Self {
        self.cutoff_mode = mode;
        self
    }

    pub fn with_failure_policy(mut self, policy: ItemFailurePolicy) -> Self {
        self.item_failure_policy = policy;
        self
    }

    pub fn is_paginated(&self) -> bool {
        self.page_param.is_some()
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.listing_path)
    }

    pub fn page_url(&self, page: u32) -> String {
        let base = self.listing_url();
        match &self.page_param {
            Some(p) => {
                let sep = if base.contains('?') { '&' } else { '?' };
                format!("{base}{sep}{p}={page}")
            }
            None => base,
        }
    }

    fn item_template(&self) -> String {
        if self.item_path.is_empty() {
            format!("{}/{{id}}", self.listing_path.trim_end_matches('/'))
        } else {
            self.item_path.clone()
        }
    }

    pub fn item_url(&self, id: ItemId) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.item_template().replace("{id}", &id.to_string())
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.sleep_interval())
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }

    pub fn window(&self, today: NaiveDate) -> Option<DateWindow> {
        match self.cutoff_mode {
            CutoffMode::DateWindow => self.date_window.as_ref()?.resolve(today),
            _ => None,
        }
    }

    pub fn skips_category(&self, category: &str) -> bool {
        let c = category.trim();
        self.skip_categories.iter().any(|s| s.trim() == c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn urls_follow_base_listing_and_template() {
        let mut feed = FeedConfig::new("notice", "https://mabinogimobile.nexon.com/");
        feed.listing_path = "/News/Notice".into();
        feed.page_param = Some("headlineId".into());
        assert_eq!(feed.listing_url(), "https://mabinogimobile.nexon.com/News/Notice");
        assert_eq!(
            feed.page_url(2),
            "https://mabinogimobile.nexon.com/News/Notice?headlineId=2"
        );
        assert_eq!(
            feed.item_url(ItemId(3120)),
            "https://mabinogimobile.nexon.com/News/Notice/3120"
        );

        feed.listing_path = "/board/lists/?id=mabinogimobile".into();
        feed.page_param = Some("page".into());
        feed.item_path = "/board/view/?id=mabinogimobile&no={id}".into();
        assert!(feed.page_url(3).ends_with("?id=mabinogimobile&page=3"));
        assert!(feed.item_url(ItemId(9)).ends_with("&no=9"));
    }

    #[test]
    fn unpaginated_feed_ignores_page_number() {
        let feed = FeedConfig::new("update", "https://example.com");
        assert!(!feed.is_paginated());
        assert_eq!(feed.page_url(4), feed.listing_url());
    }

    #[test]
    fn date_window_resolves_lookback_and_fixed_bounds() {
        let today = day(2025, 6, 17);
        let lookback = DateWindowConfig {
            lookback_days: Some(2),
            ..Default::default()
        };
        assert_eq!(
            lookback.resolve(today),
            Some(DateWindow {
                oldest: day(2025, 6, 15),
                newest: today
            })
        );

        let fixed = DateWindowConfig {
            oldest: Some(day(2025, 6, 1)),
            newest: Some(day(2025, 6, 3)),
            lookback_days: None,
        };
        assert_eq!(fixed.resolve(today).unwrap().newest, day(2025, 6, 3));

        let inverted = DateWindowConfig {
            oldest: Some(day(2025, 6, 5)),
            newest: Some(day(2025, 6, 3)),
            lookback_days: None,
        };
        assert_eq!(inverted.resolve(today), None);
        assert_eq!(DateWindowConfig::default().resolve(today), None);
    }

    #[test]
    fn skip_categories_match_trimmed() {
        let mut feed = FeedConfig::new("gallery", "https://gall.example.com");
        feed.skip_categories = vec!["공지".into(), "AD".into()];
        assert!(feed.skips_category(" 공지 "));
        assert!(!feed.skips_category("일반"));
    }
}
