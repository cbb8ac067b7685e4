//! Report identifier formatting, parsing, and allocation.
//!
//! Identifiers look like `AVR-017`: an uppercase prefix, a dash, and a
//! sequence number zero-padded to at least three digits. Numbers come from a
//! per-prefix counter owned by the [`ReportStore`], which increments it
//! atomically so concurrent allocations never collide.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::store::ReportStore;

/// Format `prefix` and `num` as a report identifier.
pub fn format_report_id(prefix: &str, num: u64) -> String {
    format!("{}-{:0>3}", prefix, num)
}

/// Allocate the next identifier for `prefix`.
///
/// The counter starts at 0 for an unseen prefix, so the first id is
/// `{prefix}-001`. Storage failures propagate; callers must not create a
/// report without a valid id.
pub async fn next_report_id(store: &dyn ReportStore, prefix: &str) -> Result<String> {
    let num = store.increment(prefix).await?;
    Ok(format_report_id(prefix, num))
}

fn report_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2,8})-(\d{3,})$").expect("static regex"))
}

fn title_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2,8})-(\d+)\s+").expect("static regex"))
}

/// Whether `prefix` can head a report id: 2-8 uppercase ASCII letters.
pub fn is_valid_prefix(prefix: &str) -> bool {
    (2..=8).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_uppercase())
}

/// Split a well-formed report id into its prefix and number.
pub fn parse_report_id(id: &str) -> Option<(&str, u64)> {
    let caps = report_id_re().captures(id)?;
    let prefix = caps.get(1)?.as_str();
    let num = caps.get(2)?.as_str().parse().ok()?;
    Some((prefix, num))
}

/// Normalize user input (`avr-17`, ` AVR-017 `) into a canonical report id.
pub fn normalize_report_id(input: &str) -> String {
    let upper = input.trim().trim_start_matches('#').to_uppercase();
    match upper.split_once('-') {
        Some((prefix, num)) => match num.parse::<u64>() {
            Ok(n) => format_report_id(prefix, n),
            Err(_) => upper,
        },
        None => upper,
    }
}

/// A leading `PREFIX-123` token found on an issue title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitlePrefix<'a> {
    pub prefix: &'a str,
    pub num: u64,
    /// The title with the token (and following whitespace) removed.
    pub rest: &'a str,
}

/// Recover an identifier scheme from the start of an external issue title.
pub fn parse_title_prefix(title: &str) -> Option<TitlePrefix<'_>> {
    let caps = title_prefix_re().captures(title)?;
    let whole = caps.get(0)?;
    Some(TitlePrefix {
        prefix: caps.get(1)?.as_str(),
        num: caps.get(2)?.as_str().parse().ok()?,
        rest: &title[whole.end()..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn test_format_pads_to_three() {
        assert_eq!(format_report_id("AVR", 1), "AVR-001");
        assert_eq!(format_report_id("AVR", 17), "AVR-017");
        assert_eq!(format_report_id("AFR", 1234), "AFR-1234");
    }

    #[test]
    fn test_parse_report_id() {
        assert_eq!(parse_report_id("AVR-017"), Some(("AVR", 17)));
        assert_eq!(parse_report_id("AVR-17"), None);
        assert_eq!(parse_report_id("avr-017"), None);
    }

    #[test]
    fn test_valid_prefix() {
        assert!(is_valid_prefix("TST"));
        assert!(!is_valid_prefix("T"));
        assert!(!is_valid_prefix("tst"));
        assert!(!is_valid_prefix("AVR1"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_report_id(" avr-17 "), "AVR-017");
        assert_eq!(normalize_report_id("#AFR-120"), "AFR-120");
        assert_eq!(normalize_report_id("garbage"), "GARBAGE");
    }

    #[test]
    fn test_title_prefix() {
        let p = parse_title_prefix("AVR-012 Crash on init").unwrap();
        assert_eq!(p.prefix, "AVR");
        assert_eq!(p.num, 12);
        assert_eq!(p.rest, "Crash on init");

        assert!(parse_title_prefix("API returns 500 on save").is_none());
        assert!(parse_title_prefix("UI freezes").is_none());

        assert!(parse_title_prefix("Crash on init").is_none());
        assert!(parse_title_prefix("A crash").is_none());
    }

    #[tokio::test]
    async fn test_allocator_sequence() {
        let store = InMemoryStore::new();
        assert_eq!(next_report_id(&store, "TST").await.unwrap(), "TST-001");
        assert_eq!(next_report_id(&store, "TST").await.unwrap(), "TST-002");
        assert_eq!(next_report_id(&store, "AFR").await.unwrap(), "AFR-001");
    }

    #[tokio::test]
    async fn test_allocator_concurrent_unique() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                next_report_id(store.as_ref(), "AVR").await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
    }
}
