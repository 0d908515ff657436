//! # Listing Scanner
//! Walks a board listing page by page (most recent first) and collects the
//! items the current cycle has to look at.
//!
//! Three bounds are supported, chosen per feed:
//! - `Watermark`: stop at the first id at or below the last processed id.
//! - `FullListing`: read every page up to `max_pages`; dedup happens later
//!   against the notified-id set.
//! - `DateWindow`: keep items dated inside an inclusive window and stop once
//!   the listing runs past its oldest day.
//!
//! Accepted items are returned ascending by id so side effects happen
//! oldest-new-first.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ListingError;
use crate::ingest::types::SiteAdapter;
use crate::item::{ItemDescriptor, ItemId};

/// How far the board can be trusted to be sorted by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrder {
    /// Strictly most-recent-first; the first id at or below the watermark ends the scan.
    #[default]
    Descending,
    /// Pinned rows may sit out of order: every row of a page is checked and
    /// the scan stops after the first page that reached the watermark.
    Unordered,
}

/// Inclusive day range, `oldest..=newest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DateWindow {
    pub oldest: NaiveDate,
    pub newest: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.oldest <= day && day <= self.newest
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanBound {
    Watermark(Option<ItemId>),
    FullListing,
    DateWindow(DateWindow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back with no usable rows.
    EmptyPage,
    /// The newest id on the page equals the watermark.
    AlreadySeen,
    /// Reached an id at or below the watermark.
    Cutoff,
    /// Went past the oldest day of the date window.
    WindowExhausted,
    /// Unpaginated board; the single listing was read.
    SinglePage,
    PageLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub accepted: Vec<ItemDescriptor>,
    pub pages_fetched: u32,
    pub skipped_rows: usize,
    pub stop: StopReason,
}

pub struct Scanner<'a> {
    adapter: &'a dyn SiteAdapter,
    feed: &'a str,
    max_pages: u32,
    order: ListingOrder,
    today: NaiveDate,
}

enum PageVerdict {
    Continue,
    Stop(StopReason),
}

impl<'a> Scanner<'a> {
    pub fn new(adapter: &'a dyn SiteAdapter, feed: &'a str) -> Self {
        Self {
            adapter,
            feed,
            max_pages: 5,
            order: ListingOrder::Descending,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// `0` is treated as 1; the first page is always read.
    pub fn max_pages(mut self, n: u32) -> Self {
        self.max_pages = n.max(1);
        self
    }

    pub fn order(mut self, order: ListingOrder) -> Self {
        self.order = order;
        self
    }

    /// Day used for rows that only show a clock time.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub async fn scan(&self, bound: &ScanBound) -> Result<ScanOutcome, ListingError> {
        let mut accepted: Vec<ItemDescriptor> = Vec::new();
        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut skipped_rows = 0usize;
        let mut pages_fetched = 0u32;

        let last_page = if self.adapter.is_paginated() {
            self.max_pages
        } else {
            1
        };

        let mut stop = StopReason::PageLimit;
        for page in 1..=last_page {
            let rows = self
                .adapter
                .fetch_listing_page(self.feed, page)
                .await
                .map_err(|source| ListingError { page, source })?;
            pages_fetched += 1;

            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                match ItemDescriptor::try_from(row) {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        skipped_rows += 1;
                        warn!(feed = self.feed, page, error = %e, "skipping listing row");
                    }
                }
            }

            if items.is_empty() {
                stop = StopReason::EmptyPage;
                break;
            }

            let mut accept = |item: ItemDescriptor| {
                if seen.insert(item.id) {
                    accepted.push(item);
                }
            };

            let verdict = match bound {
                ScanBound::Watermark(w) => self.scan_watermark_page(items, *w, &mut accept),
                ScanBound::FullListing => {
                    items.into_iter().for_each(&mut accept);
                    PageVerdict::Continue
                }
                ScanBound::DateWindow(window) => {
                    self.scan_window_page(page, items, window, &mut skipped_rows, &mut accept)
                }
            };

            debug!(feed = self.feed, page, accepted = accepted.len(), "listing page scanned");

            if let PageVerdict::Stop(reason) = verdict {
                stop = reason;
                break;
            }
            if !self.adapter.is_paginated() {
                stop = StopReason::SinglePage;
                break;
            }
        }

        accepted.sort_by_key(|it| it.id);

        Ok(ScanOutcome {
            accepted,
            pages_fetched,
            skipped_rows,
            stop,
        })
    }

    fn scan_watermark_page(
        &self,
        items: Vec<ItemDescriptor>,
        watermark: Option<ItemId>,
        accept: &mut impl FnMut(ItemDescriptor),
    ) -> PageVerdict {
        let Some(w) = watermark else {
            // First run: nothing is known yet
            items.into_iter().for_each(accept);
            return PageVerdict::Continue;
        };

        match self.order {
            ListingOrder::Descending => {
                let page_max = items.iter().map(|it| it.id).max();
                if page_max == Some(w) {
                    return PageVerdict::Stop(StopReason::AlreadySeen);
                }
                for item in items {
                    if item.id <= w {
                        return PageVerdict::Stop(StopReason::Cutoff);
                    }
                    accept(item);
                }
                PageVerdict::Continue
            }
            ListingOrder::Unordered => {
                let mut reached = false;
                for item in items {
                    if item.id <= w {
                        reached = true;
                    } else {
                        accept(item);
                    }
                }
                if reached {
                    PageVerdict::Stop(StopReason::Cutoff)
                } else {
                    PageVerdict::Continue
                }
            }
        }
    }

    fn scan_window_page(
        &self,
        page: u32,
        items: Vec<ItemDescriptor>,
        window: &DateWindow,
        skipped_rows: &mut usize,
        accept: &mut impl FnMut(ItemDescriptor),
    ) -> PageVerdict {
        let mut past_window = false;
        for item in items {
            let Some(day) = item.published_date(self.today) else {
                *skipped_rows += 1;
                warn!(
                    feed = self.feed,
                    page,
                    item_id = %item.id,
                    date = item.published_at.as_str(),
                    "unparseable date, skipping row"
                );
                continue;
            };
            if day > window.newest {
                continue;
            }
            if day < window.oldest {
                past_window = true;
                if self.order == ListingOrder::Descending {
                    break;
                }
                continue;
            }
            accept(item);
        }
        if past_window {
            PageVerdict::Stop(StopReason::WindowExhausted)
        } else {
            PageVerdict::Continue
        }
    }
}
