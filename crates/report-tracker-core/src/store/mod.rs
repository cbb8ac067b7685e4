//! Storage abstraction for reports.
//!
//! The [`ReportStore`] trait is the only shared mutable resource in the
//! system. Implementations provide full-overwrite upserts, predicate scans,
//! the two secondary lookups (tracker message, mirrored issue), and the
//! per-prefix identifier counters.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IssueRef, Report, ReportKind, UserId};

/// Declarative predicate for [`ReportStore::scan`].
///
/// Kept as data rather than a closure so backends can push parts of it
/// down into their query language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub kind: Option<ReportKind>,
    /// Only `Open` or `PendingPatch` reports.
    pub open_only: bool,
    /// Only `PendingPatch` reports.
    pub pending_only: bool,
    /// Only reports this user is subscribed to.
    pub subscriber: Option<UserId>,
}

impl ReportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn pending() -> Self {
        Self {
            pending_only: true,
            ..Self::default()
        }
    }

    pub fn subscribed(user: UserId) -> Self {
        Self {
            subscriber: Some(user),
            ..Self::default()
        }
    }

    pub fn open_features() -> Self {
        Self {
            kind: Some(ReportKind::FeatureRequest),
            open_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, report: &Report) -> bool {
        if let Some(kind) = self.kind {
            if report.kind != kind {
                return false;
            }
        }
        if self.open_only && !report.status.is_open() {
            return false;
        }
        if self.pending_only && !report.status.is_pending() {
            return false;
        }
        if let Some(user) = self.subscriber {
            if !report.subscribers.contains(&user) {
                return false;
            }
        }
        true
    }
}

/// Abstract storage backend for reports.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](ReportStore::get) | Fetch a report by id |
/// | [`put`](ReportStore::put) | Full-overwrite upsert |
/// | [`delete`](ReportStore::delete) | Remove a report (untrack only) |
/// | [`scan`](ReportStore::scan) | All reports matching a filter |
/// | [`find_by_message`](ReportStore::find_by_message) | Lookup by tracker message id |
/// | [`find_by_issue`](ReportStore::find_by_issue) | Lookup by mirrored issue |
/// | [`increment`](ReportStore::increment) | Atomically bump a prefix counter |
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn get(&self, report_id: &str) -> Result<Option<Report>>;

    /// Insert or fully overwrite a report.
    ///
    /// Fails if another report already owns the same tracker message or
    /// the same mirrored issue.
    async fn put(&self, report: &Report) -> Result<()>;

    /// Returns `true` if a report was removed.
    async fn delete(&self, report_id: &str) -> Result<bool>;

    async fn scan(&self, filter: &ReportFilter) -> Result<Vec<Report>>;

    async fn find_by_message(&self, message_id: u64) -> Result<Option<Report>>;

    async fn find_by_issue(&self, issue: &IssueRef) -> Result<Option<Report>>;

    /// Increment the counter for `prefix` (starting from 0) and return the new value.
    async fn increment(&self, prefix: &str) -> Result<u64>;
}
