//! # Items
//! The normalized unit of work shared by the scanner, the gate and the adapters.
//!
//! Identity is the numeric thread id and nothing else. Titles and dates are
//! display data; they are never used for dedup or cutoff decisions.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Category used when the listing row carries no type tag.
pub const DEFAULT_CATEGORY: &str = "general";

/// Thread id as published by the board. Ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl From<u64> for ItemId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() {
            return Err(ParseError::MissingId);
        }
        t.parse::<u64>()
            .map(ItemId)
            .map_err(|_| ParseError::InvalidId(t.to_string()))
    }
}

/// Raw row as scraped from a listing page, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingRow {
    pub id: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub published_at: Option<String>,
    /// Event run time text (`start ~ end`), when the board shows one.
    pub period: Option<String>,
}

impl ListingRow {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.published_at = Some(date.into());
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }
}

/// Reader comment under a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub date: String,
}

/// What a detail page yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDetail {
    pub body: String,
    pub comments: Vec<Comment>,
}

impl From<String> for ItemDetail {
    fn from(body: String) -> Self {
        Self {
            body,
            comments: Vec::new(),
        }
    }
}

/// When an event post runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPeriod {
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

impl EventPeriod {
    pub fn has_ended(&self, now: NaiveDateTime) -> bool {
        now > self.ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub id: ItemId,
    pub title: String,
    pub category: String,
    /// Date text exactly as the board shows it.
    #[serde(default)]
    pub published_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<EventPeriod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

impl ItemDescriptor {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: DEFAULT_CATEGORY.to_string(),
            published_at: String::new(),
            body: None,
            attachment_path: None,
            period: None,
            comments: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.published_at = date.into();
        self
    }

    pub fn with_period(mut self, period: EventPeriod) -> Self {
        self.period = Some(period);
        self
    }

    /// Calendar date of the post, if the board text is in a known shape.
    ///
    /// Boards show a bare `HH:MM` for posts from the current day, so `today`
    /// is returned for those.
    pub fn published_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        parse_board_date(&self.published_at, today)
    }
}

impl TryFrom<ListingRow> for ItemDescriptor {
    type Error = ParseError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let raw_id = row.id.ok_or(ParseError::MissingId)?;
        let id: ItemId = raw_id.parse()?;

        let title = row
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ParseError::MissingField {
                id: id.to_string(),
                field: "title",
            })?;

        let category = row
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let period = row.period.as_deref().and_then(|raw| {
            let parsed = parse_event_period(raw);
            if parsed.is_none() {
                tracing::debug!(item_id = %id, period = raw, "period text not understood");
            }
            parsed
        });

        Ok(Self {
            id,
            title,
            category,
            published_at: row.published_at.unwrap_or_default().trim().to_string(),
            body: None,
            attachment_path: None,
            period,
            comments: Vec::new(),
        })
    }
}

// Two-digit years first: "%Y" would happily read "25" as year 25.
const DATE_FORMATS: [&str; 4] = ["%y.%m.%d", "%Y.%m.%d", "%Y-%m-%d", "%Y/%m/%d"];

pub fn parse_board_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    // "2025.06.17 10:32" and "2025.06.17(Tue)" carry the date in the first token
    let head = raw
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .trim();
    if head.is_empty() {
        return None;
    }

    if is_clock(head) {
        return Some(today);
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

fn is_clock(s: &str) -> bool {
    match s.split_once(':') {
        Some((h, m)) => {
            !h.is_empty()
                && h.len() <= 2
                && m.len() == 2
                && h.chars().all(|c| c.is_ascii_digit())
                && m.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Parse `start ~ end` run times such as
/// `2025.06.12(목) 점검 후 ~ 2025.07.10(목) 오전 5시 59분까지`.
///
/// "After maintenance" means 06:00. A date without a time starts at 06:00
/// and ends at 05:59, the daily reset.
pub fn parse_event_period(raw: &str) -> Option<EventPeriod> {
    let (start, end) = raw.split_once('~')?;
    let end = end.trim().trim_end_matches("까지");
    Some(EventPeriod {
        starts_at: parse_period_point(start, true)?,
        ends_at: parse_period_point(end, false)?,
    })
}

fn parse_period_point(raw: &str, is_start: bool) -> Option<NaiveDateTime> {
    static RE_POINT: OnceCell<Regex> = OnceCell::new();
    let re = RE_POINT.get_or_init(|| {
        Regex::new(
            r"^(\d{4})\.(\d{1,2})\.(\d{1,2})(?:\s*\([^)]*\))?\s*(?:(오전|오후)\s*)?(?:(\d{1,2})\s*(?:시|:)\s*(?:(\d{1,2})\s*분?)?)?",
        )
        .expect("static regex")
    });

    let text = raw.trim().replace("점검 후", "오전 6시");
    let caps = re.captures(&text)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;
    let (hour, minute) = match num(5) {
        None if is_start => (6, 0),
        None => (5, 59),
        Some(h) => {
            let h = match caps.get(4).map(|m| m.as_str()) {
                Some("오후") if h != 12 => h + 12,
                Some("오전") if h == 12 => 0,
                _ => h,
            };
            (h, num(6).unwrap_or(0))
        }
    };
    date.and_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn item_id_parses_trimmed_digits_only() {
        assert_eq!(" 1042 ".parse::<ItemId>().unwrap(), ItemId(1042));
        assert_eq!("".parse::<ItemId>(), Err(ParseError::MissingId));
        assert_eq!(
            "12a".parse::<ItemId>(),
            Err(ParseError::InvalidId("12a".into()))
        );
    }

    #[test]
    fn row_without_type_gets_default_category() {
        let item = ItemDescriptor::try_from(ListingRow::new("7", " Patch notes ")).unwrap();
        assert_eq!(item.id, ItemId(7));
        assert_eq!(item.title, "Patch notes");
        assert_eq!(item.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn row_without_title_is_rejected() {
        let row = ListingRow {
            id: Some("9".into()),
            ..Default::default()
        };
        assert!(matches!(
            ItemDescriptor::try_from(row),
            Err(ParseError::MissingField { field: "title", .. })
        ));
    }

    #[test]
    fn board_dates_in_several_shapes() {
        let today = day(2025, 6, 17);
        assert_eq!(parse_board_date("2025.06.15", today), Some(day(2025, 6, 15)));
        assert_eq!(parse_board_date("25.06.15", today), Some(day(2025, 6, 15)));
        assert_eq!(parse_board_date("2025-06-15 10:00", today), Some(day(2025, 6, 15)));
        assert_eq!(parse_board_date("2025.06.15(Sun)", today), Some(day(2025, 6, 15)));
        assert_eq!(parse_board_date("14:22", today), Some(today));
        assert_eq!(parse_board_date("yesterday", today), None);
        assert_eq!(parse_board_date("", today), None);
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        day(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn event_periods_with_maintenance_and_clock_times() {
        let p = parse_event_period("2025.06.12(목) 점검 후 ~ 2025.07.10(목) 오전 5시 59분까지").unwrap();
        assert_eq!(p.starts_at, at(2025, 6, 12, 6, 0));
        assert_eq!(p.ends_at, at(2025, 7, 10, 5, 59));

        let p = parse_event_period("2025.06.19(목) 오후 2시 ~ 2025.06.19(목) 오후 11시 30분").unwrap();
        assert_eq!(p.starts_at, at(2025, 6, 19, 14, 0));
        assert_eq!(p.ends_at, at(2025, 6, 19, 23, 30));

        let p = parse_event_period("2025.06.01 ~ 2025.06.30").unwrap();
        assert_eq!(p.starts_at, at(2025, 6, 1, 6, 0));
        assert_eq!(p.ends_at, at(2025, 6, 30, 5, 59));

        let p = parse_event_period("2025.06.01 오전 12시 ~ 2025.06.02 14:05").unwrap();
        assert_eq!(p.starts_at, at(2025, 6, 1, 0, 0));
        assert_eq!(p.ends_at, at(2025, 6, 2, 14, 5));
    }

    #[test]
    fn event_period_needs_both_ends() {
        assert_eq!(parse_event_period("2025.06.12(목) 점검 후"), None);
        assert_eq!(parse_event_period("상시 진행 ~ 별도 안내 시까지"), None);
        assert_eq!(parse_event_period("2025.13.01 ~ 2025.13.02"), None);
    }

    #[test]
    fn ended_means_strictly_after_the_end() {
        let p = parse_event_period("2025.06.01 ~ 2025.06.10 오후 6시").unwrap();
        assert!(!p.has_ended(at(2025, 6, 10, 18, 0)));
        assert!(p.has_ended(at(2025, 6, 10, 18, 1)));
    }

    #[test]
    fn row_period_is_parsed_into_the_item() {
        let row = ListingRow::new("40", "여름 이벤트").with_period("2025.06.12 ~ 2025.07.10");
        let item = ItemDescriptor::try_from(row).unwrap();
        assert_eq!(item.period.unwrap().ends_at, at(2025, 7, 10, 5, 59));

        let row = ListingRow::new("41", "상시 이벤트").with_period("상시");
        assert_eq!(ItemDescriptor::try_from(row).unwrap().period, None);
    }
}
