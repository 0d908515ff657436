// src/ingest/providers/board_html.rs
//! Server-rendered HTML boards. Row layout comes from the feed's CSS selectors,
//! so one adapter covers every board that renders its listing as markup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::config::{CommentSelectors, FeedConfig, SelectorConfig, Settings};
use crate::error::{FetchError, ParseError};
use crate::ingest::retry::{with_retries, RetryPolicy};
use crate::ingest::types::SiteAdapter;
use crate::ingest::{join_fragments, normalize_text};
use crate::item::{Comment, ItemDescriptor, ItemDetail, ListingRow};

pub struct BoardAdapter {
    feed: FeedConfig,
    client: Client,
    retry: RetryPolicy,
    pause: Duration,
    dump_dir: Option<PathBuf>,
}

impl BoardAdapter {
    /// Fails on an unusable selector or HTTP client setup, before any request is made.
    pub fn new(feed: FeedConfig, settings: &Settings) -> Result<Self> {
        check_selectors(&feed.selectors)
            .with_context(|| format!("feed {:?}: invalid selectors", feed.key))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("building board http client")?;

        let dump_dir = feed.debug_dump.then(|| settings.state_dir.join("debug"));
        Ok(Self {
            retry: feed.retry_policy(),
            pause: feed.sleep_interval(),
            feed,
            client,
            dump_dir,
        })
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let rsp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        rsp.text().await.map_err(|e| FetchError::transport(url, e))
    }

    async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let out = with_retries(&self.retry, url, |_| self.get_once(url)).await;
        // stay polite between requests, successful or not
        tokio::time::sleep(self.pause).await;
        if out.is_err() {
            counter!("watch_fetch_errors_total").increment(1);
        }
        out
    }

    async fn dump_listing(&self, html: &str) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let path = dir.join(format!(
            "{}_listing.html",
            crate::state::file::file_stem(&self.feed.key)
        ));
        let res = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, html).await
        }
        .await;
        if let Err(e) = res {
            tracing::warn!(feed = self.feed.key.as_str(), path = %path.display(), error = %e, "debug dump failed");
        }
    }
}

#[async_trait]
impl SiteAdapter for BoardAdapter {
    async fn fetch_listing_page(
        &self,
        feed: &str,
        page: u32,
    ) -> Result<Vec<ListingRow>, FetchError> {
        let url = self.feed.page_url(page);
        let html = self.get_html(&url).await?;
        if page == 1 {
            self.dump_listing(&html).await;
        }

        let mut rows = match parse_listing(&html, &self.feed.selectors) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(feed, page, error = %e, "listing parse failed");
                return Ok(Vec::new());
            }
        };
        if rows.is_empty() && !html.trim().is_empty() {
            tracing::warn!(feed, page, url = url.as_str(), "no listing rows matched the row selector");
        }

        let before = rows.len();
        rows.retain(|r| {
            !r.category
                .as_deref()
                .is_some_and(|c| self.feed.skips_category(c))
        });
        if rows.len() != before {
            tracing::debug!(feed, page, dropped = before - rows.len(), "dropped rows by category");
        }
        Ok(rows)
    }

    async fn fetch_item_detail(&self, item: &ItemDescriptor) -> Result<ItemDetail, FetchError> {
        let url = self.item_url(item);
        let html = self.get_html(&url).await?;
        let key = self.feed.key.as_str();

        let doc = Html::parse_document(&html);
        let body = match detail_body(&doc, &self.feed.selectors.body) {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::warn!(feed = key, item_id = %item.id, "detail page has no body container");
                String::new()
            }
            Err(e) => {
                tracing::warn!(feed = key, item_id = %item.id, error = %e, "detail parse failed");
                String::new()
            }
        };
        let comments = match &self.feed.selectors.comments {
            Some(sel) => detail_comments(&doc, sel).unwrap_or_else(|e| {
                tracing::warn!(feed = key, item_id = %item.id, error = %e, "comment parse failed");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(ItemDetail { body, comments })
    }

    fn item_url(&self, item: &ItemDescriptor) -> String {
        self.feed.item_url(item.id)
    }

    fn feed_url(&self) -> String {
        self.feed.listing_url()
    }

    fn is_paginated(&self) -> bool {
        self.feed.is_paginated()
    }

    fn name(&self) -> &'static str {
        "board_html"
    }
}

fn selector(s: &str) -> Result<Selector, ParseError> {
    Selector::parse(s).map_err(|e| ParseError::Selector(format!("{s}: {e}")))
}

fn check_selectors(sel: &SelectorConfig) -> Result<(), ParseError> {
    selector(&sel.row)?;
    selector(&sel.title)?;
    selector(&sel.body)?;
    for s in [&sel.id_selector, &sel.date, &sel.category, &sel.period]
        .into_iter()
        .flatten()
    {
        selector(s)?;
    }
    if let Some(c) = &sel.comments {
        for s in [&c.row, &c.id, &c.text] {
            selector(s)?;
        }
        if let Some(d) = &c.date {
            selector(d)?;
        }
    }
    Ok(())
}

fn first_text(el: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|e| normalize_text(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Extract raw rows from a listing page. Rows keep whatever they could read;
/// validation (id, title) happens when they become items.
pub fn parse_listing(html: &str, sel: &SelectorConfig) -> Result<Vec<ListingRow>, ParseError> {
    let row_sel = selector(&sel.row)?;
    let title_sel = selector(&sel.title)?;
    let id_sel = sel.id_selector.as_deref().map(selector).transpose()?;
    let date_sel = sel.date.as_deref().map(selector).transpose()?;
    let cat_sel = sel.category.as_deref().map(selector).transpose()?;
    let period_sel = sel.period.as_deref().map(selector).transpose()?;

    let doc = Html::parse_document(html);
    let rows = doc
        .select(&row_sel)
        .map(|row| {
            let id = match &id_sel {
                Some(s) => first_text(&row, s),
                None => row.value().attr(&sel.id_attr).map(|v| v.trim().to_string()),
            };
            ListingRow {
                id,
                title: first_text(&row, &title_sel),
                category: cat_sel.as_ref().and_then(|s| first_text(&row, s)),
                published_at: date_sel.as_ref().and_then(|s| first_text(&row, s)),
                period: period_sel.as_ref().and_then(|s| first_text(&row, s)),
            }
        })
        .collect();
    Ok(rows)
}

/// Post body text, or `None` when the container is missing.
pub fn parse_detail(html: &str, body_selector: &str) -> Result<Option<String>, ParseError> {
    detail_body(&Html::parse_document(html), body_selector)
}

/// Comments on a detail page. Blocks without an id or text are left out.
pub fn parse_comments(html: &str, sel: &CommentSelectors) -> Result<Vec<Comment>, ParseError> {
    detail_comments(&Html::parse_document(html), sel)
}

fn detail_body(doc: &Html, body_selector: &str) -> Result<Option<String>, ParseError> {
    let body_sel = selector(body_selector)?;
    let block_sel = selector("p, span")?;

    let Some(container) = doc.select(&body_sel).next() else {
        return Ok(None);
    };

    let blocks: Vec<String> = container
        .select(&block_sel)
        .map(|e| e.text().collect::<String>())
        .collect();
    if blocks.is_empty() {
        return Ok(Some(normalize_text(&container.text().collect::<String>())));
    }
    Ok(Some(join_fragments(blocks)))
}

fn detail_comments(doc: &Html, sel: &CommentSelectors) -> Result<Vec<Comment>, ParseError> {
    let row_sel = selector(&sel.row)?;
    let id_sel = selector(&sel.id)?;
    let text_sel = selector(&sel.text)?;
    let date_sel = sel.date.as_deref().map(selector).transpose()?;

    let comments = doc
        .select(&row_sel)
        .filter_map(|row| {
            Some(Comment {
                id: first_text(&row, &id_sel)?,
                text: first_text(&row, &text_sel)?,
                date: date_sel
                    .as_ref()
                    .and_then(|s| first_text(&row, s))
                    .unwrap_or_default(),
            })
        })
        .collect();
    Ok(comments)
}
