// src/ingest/providers/mod.rs
pub mod board_html;

pub use board_html::{parse_detail, parse_listing, BoardAdapter};
