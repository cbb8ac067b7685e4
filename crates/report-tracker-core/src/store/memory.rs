//! In-memory [`ReportStore`] implementation for testing.
//!
//! Uses `HashMap` behind `std::sync::RwLock`. Counter increments happen
//! under a single write lock, so they are atomic with respect to each other.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{IssueRef, Report};

use super::{ReportFilter, ReportStore};

/// In-memory store for tests and dry runs.
pub struct InMemoryStore {
    reports: RwLock<HashMap<String, Report>>,
    counters: RwLock<HashMap<String, u64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            reports: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn get(&self, report_id: &str) -> Result<Option<Report>> {
        Ok(self.reports.read().unwrap().get(report_id).cloned())
    }

    async fn put(&self, report: &Report) -> Result<()> {
        let mut reports = self.reports.write().unwrap();
        for other in reports.values() {
            if other.report_id == report.report_id {
                continue;
            }
            if let (Some(a), Some(b)) = (&other.message, &report.message) {
                if a.message_id == b.message_id {
                    bail!(
                        "message {} already belongs to {}",
                        a.message_id,
                        other.report_id
                    );
                }
            }
            if other.issue.is_some() && other.issue == report.issue {
                bail!("issue already belongs to {}", other.report_id);
            }
        }
        reports.insert(report.report_id.clone(), report.clone());
        Ok(())
    }

    async fn delete(&self, report_id: &str) -> Result<bool> {
        Ok(self.reports.write().unwrap().remove(report_id).is_some())
    }

    async fn scan(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let reports = self.reports.read().unwrap();
        let mut out: Vec<Report> = reports
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.report_id.cmp(&b.report_id));
        Ok(out)
    }

    async fn find_by_message(&self, message_id: u64) -> Result<Option<Report>> {
        let reports = self.reports.read().unwrap();
        Ok(reports
            .values()
            .find(|r| r.message.map(|m| m.message_id) == Some(message_id))
            .cloned())
    }

    async fn find_by_issue(&self, issue: &IssueRef) -> Result<Option<Report>> {
        let reports = self.reports.read().unwrap();
        Ok(reports
            .values()
            .find(|r| r.issue.as_ref() == Some(issue))
            .cloned())
    }

    async fn increment(&self, prefix: &str) -> Result<u64> {
        let mut counters = self.counters.write().unwrap();
        let num = counters.entry(prefix.to_string()).or_insert(0);
        *num += 1;
        Ok(*num)
    }
}
