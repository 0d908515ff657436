// tests/config_runtime.rs
use std::sync::Arc;

use board_watcher::config::{load_config_from, CutoffMode, ItemFailurePolicy};
use board_watcher::ingest::providers::parse_listing;
use board_watcher::ingest::scanner::ListingOrder;
use board_watcher::ingest::scheduler::build_runners;
use board_watcher::notify::LogNotifier;
use board_watcher::ItemDescriptor;

const FEEDS: &str = r#"
[settings]
state_dir = "state"
output_dir = "output"
interval_secs = 600

[[feed]]
key = "update"
base_url = "https://mabinogimobile.nexon.com"
listing_path = "/News/Update"
category_label = "update"
listing_order = "unordered"

[[feed]]
key = "gallery"
base_url = "https://gall.dcinside.com"
listing_path = "/mgallery/board/lists/?id=mabinogimobile"
item_path = "/mgallery/board/view/?id=mabinogimobile&no={id}"
page_param = "page"
max_pages = 20
max_retries = 3
cutoff_mode = "date_window"
item_failure_policy = "abort"
skip_categories = ["공지", "AD", "설문"]

[feed.date_window]
lookback_days = 1

[feed.selectors]
row = "tr.ub-content"
id_selector = "td.gall_num"
title = "td.gall_tit a"
date = "td.gall_date"
category = "td.gall_subject"
body = "div.write_div"
"#;

fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("feeds.toml");
    std::fs::write(&path, body).unwrap();
    (tmp, path)
}

#[test]
fn feeds_file_loads_with_per_feed_policies() {
    let (_tmp, path) = write_config(FEEDS);
    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.settings.interval_secs, 600);

    let update = cfg.feed("update").unwrap();
    assert_eq!(update.listing_order, ListingOrder::Unordered);
    assert!(!update.is_paginated());

    let gallery = cfg.feed("gallery").unwrap();
    assert_eq!(gallery.cutoff_mode, CutoffMode::DateWindow);
    assert_eq!(gallery.item_failure_policy, ItemFailurePolicy::Abort);
    assert_eq!(gallery.retry_policy().attempts(), 4);
    assert_eq!(
        gallery.page_url(2),
        "https://gall.dcinside.com/mgallery/board/lists/?id=mabinogimobile&page=2"
    );
}

#[test]
fn gallery_selectors_parse_a_table_listing() {
    let (_tmp, path) = write_config(FEEDS);
    let cfg = load_config_from(&path).unwrap();
    let gallery = cfg.feed("gallery").unwrap();

    let html = r#"
<table class="gall_list"><tbody>
  <tr class="ub-content"><td class="gall_num">AD</td><td class="gall_subject">AD</td>
      <td class="gall_tit"><a>광고</a></td><td class="gall_date">06.17</td></tr>
  <tr class="ub-content"><td class="gall_num">90412</td><td class="gall_subject">일반</td>
      <td class="gall_tit"><a> 오늘 패치 후기 </a></td><td class="gall_date">13:05</td></tr>
</tbody></table>"#;
    let rows = parse_listing(html, &gallery.selectors).unwrap();
    let kept: Vec<_> = rows
        .into_iter()
        .filter(|r| !r.category.as_deref().is_some_and(|c| gallery.skips_category(c)))
        .collect();
    assert_eq!(kept.len(), 1);

    let item = ItemDescriptor::try_from(kept[0].clone()).unwrap();
    assert_eq!(item.id.0, 90412);
    assert_eq!(item.title, "오늘 패치 후기");
    assert_eq!(item.category, "일반");
}

#[test]
fn invalid_config_is_rejected_at_load() {
    let (_tmp, path) = write_config(
        r#"
[[feed]]
key = "gallery"
base_url = "https://gall.dcinside.com"
cutoff_mode = "date_window"
"#,
    );
    let err = load_config_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("date_window"));
}

#[tokio::test]
async fn runners_are_built_for_every_feed() {
    let (_tmp, path) = write_config(FEEDS);
    let cfg = load_config_from(&path).unwrap();
    let runners = build_runners(&cfg, Arc::new(LogNotifier)).unwrap();
    let keys: Vec<&str> = runners.iter().map(|r| r.key()).collect();
    assert_eq!(keys, vec!["update", "gallery"]);
}

#[tokio::test]
async fn broken_selector_fails_runner_construction() {
    let (_tmp, path) = write_config(
        r#"
[[feed]]
key = "bad"
base_url = "https://example.com"

[feed.selectors]
row = "li.item["
"#,
    );
    let cfg = load_config_from(&path).unwrap();
    let err = build_runners(&cfg, Arc::new(LogNotifier)).err().unwrap();
    assert!(format!("{err:#}").contains("invalid selectors"));
}
