//! Title search over reports.
//!
//! Three passes, first hit wins:
//! 1. case-insensitive exact title match
//! 2. case-insensitive substring match
//! 3. Jaro-Winkler similarity above [`FUZZY_THRESHOLD`], best first
//!
//! A single candidate from any pass is a confident match.

use report_tracker_core::Report;

/// Minimum Jaro-Winkler similarity for a fuzzy candidate.
pub const FUZZY_THRESHOLD: f64 = 0.75;

/// Most candidates returned when the match is ambiguous.
pub const MAX_CANDIDATES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Exactly one report matched.
    Match(Report),
    /// Several reports matched, best first, capped at [`MAX_CANDIDATES`].
    Candidates(Vec<Report>),
    NoMatch,
}

pub fn search_reports(reports: Vec<Report>, query: &str) -> SearchOutcome {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return SearchOutcome::NoMatch;
    }

    if let Some(exact) = reports.iter().find(|r| r.title.to_lowercase() == needle) {
        return SearchOutcome::Match(exact.clone());
    }

    let substring: Vec<Report> = reports
        .iter()
        .filter(|r| r.title.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if !substring.is_empty() {
        return pick(substring);
    }

    let mut scored: Vec<(f64, Report)> = reports
        .into_iter()
        .map(|r| (strsim::jaro_winkler(&needle, &r.title.to_lowercase()), r))
        .filter(|(score, _)| *score >= FUZZY_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    pick(scored.into_iter().map(|(_, r)| r).collect())
}

fn pick(mut found: Vec<Report>) -> SearchOutcome {
    match found.len() {
        0 => SearchOutcome::NoMatch,
        1 => SearchOutcome::Match(found.remove(0)),
        _ => {
            found.truncate(MAX_CANDIDATES);
            SearchOutcome::Candidates(found)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_tracker_core::{Author, ReportKind};

    fn reports(titles: &[&str]) -> Vec<Report> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Report::new(
                    format!("AVR-{:03}", i + 1),
                    ReportKind::Bug,
                    *t,
                    Author::User(1),
                    "",
                    "org/repo",
                )
            })
            .collect()
    }

    #[test]
    fn test_exact_beats_substring() {
        let rs = reports(&["Init crash", "Init crash on reload"]);
        match search_reports(rs, "init CRASH") {
            SearchOutcome::Match(r) => assert_eq!(r.report_id, "AVR-001"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_substring_candidates() {
        let rs = reports(&["Init crash", "Crash on reload", "Dark mode"]);
        match search_reports(rs, "crash on") {
            SearchOutcome::Match(r) => assert_eq!(r.report_id, "AVR-002"),
            other => panic!("unexpected {:?}", other),
        }
        let rs = reports(&["Init crash", "Crash on reload", "Dark mode"]);
        match search_reports(rs, "crash") {
            SearchOutcome::Candidates(c) => assert_eq!(c.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fuzzy_fallback() {
        let rs = reports(&["Dark mode", "Spell slots reset"]);
        match search_reports(rs, "drak mode") {
            SearchOutcome::Match(r) => assert_eq!(r.title, "Dark mode"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_match() {
        assert_eq!(
            search_reports(reports(&["Dark mode"]), "zzzzqqq"),
            SearchOutcome::NoMatch
        );
        assert_eq!(search_reports(reports(&["Dark mode"]), "  "), SearchOutcome::NoMatch);
    }
}
