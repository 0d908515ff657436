// src/ingest/mod.rs
pub mod providers;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Collapse whitespace (NBSP included) and trim.
pub fn normalize_text(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\x{200B}]+").expect("static regex"));
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Join text fragments of a post body, dropping empties and any fragment seen
/// before. Nested `p`/`span` blocks repeat their text, so without this a
/// paragraph shows up two or three times.
pub fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept: Vec<String> = Vec::new();
    for frag in fragments {
        let t = normalize_text(frag.as_ref());
        if t.is_empty() || kept.iter().any(|k| *k == t) {
            continue;
        }
        kept.push(t);
    }
    kept.join(" ")
}
