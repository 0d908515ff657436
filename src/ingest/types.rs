// src/ingest/types.rs
use async_trait::async_trait;

use crate::error::FetchError;
use crate::item::{ItemDescriptor, ItemDetail, ListingRow};

/// One remote board as seen by the core: listing pages plus detail pages.
///
/// Listing pages come back in the board's natural order, most recent first.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    async fn fetch_listing_page(&self, feed: &str, page: u32)
        -> Result<Vec<ListingRow>, FetchError>;

    /// Body text plus any comments the board shows under the post.
    async fn fetch_item_detail(&self, item: &ItemDescriptor) -> Result<ItemDetail, FetchError>;

    /// Public URL of a single post.
    fn item_url(&self, item: &ItemDescriptor) -> String;

    /// Public URL of the board listing itself.
    fn feed_url(&self) -> String;

    /// `false` for boards with a single listing endpoint.
    fn is_paginated(&self) -> bool;

    fn name(&self) -> &'static str;
}
