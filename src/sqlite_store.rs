//! SQLite-backed [`ReportStore`] implementation.
//!
//! Each report is stored as a JSON document in `reports.data`, alongside
//! the columns needed for the secondary lookups (`message_id`,
//! `issue_repo`/`issue_number`) and coarse scan filters (`kind`, `status`).
//! Unique partial indexes on the lookup columns enforce that at most one
//! report owns a given tracker message or mirrored issue.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use report_tracker_core::store::{ReportFilter, ReportStore};
use report_tracker_core::{IssueRef, Report};

/// SQLite implementation of the [`ReportStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Report> {
    let data: String = row.get("data");
    let id: String = row.get("report_id");
    serde_json::from_str(&data).with_context(|| format!("corrupt report record: {}", id))
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn get(&self, report_id: &str) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT report_id, data FROM reports WHERE report_id = ?")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn put(&self, report: &Report) -> Result<()> {
        let data = serde_json::to_string(report)?;
        sqlx::query(
            r#"
            INSERT INTO reports (report_id, kind, status, message_id, issue_repo,
                                 issue_number, updated_at, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(report_id) DO UPDATE SET
                kind = excluded.kind,
                status = excluded.status,
                message_id = excluded.message_id,
                issue_repo = excluded.issue_repo,
                issue_number = excluded.issue_number,
                updated_at = excluded.updated_at,
                data = excluded.data
            "#,
        )
        .bind(&report.report_id)
        .bind(report.kind.as_str())
        .bind(report.status.as_str())
        .bind(report.message.map(|m| m.message_id as i64))
        .bind(report.issue.as_ref().map(|i| i.repo.clone()))
        .bind(report.issue.as_ref().map(|i| i.number as i64))
        .bind(chrono::Utc::now().timestamp())
        .bind(data)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write report {}", report.report_id))?;
        Ok(())
    }

    async fn delete(&self, report_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE report_id = ?")
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        // Push the status part of the filter into SQL; the rest is checked
        // on the decoded record.
        let sql = if filter.pending_only {
            "SELECT report_id, data FROM reports WHERE status = 'pending_patch' ORDER BY report_id"
        } else if filter.open_only {
            "SELECT report_id, data FROM reports WHERE status != 'resolved' ORDER BY report_id"
        } else {
            "SELECT report_id, data FROM reports ORDER BY report_id"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let report = decode(row)?;
            if filter.matches(&report) {
                out.push(report);
            }
        }
        Ok(out)
    }

    async fn find_by_message(&self, message_id: u64) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT report_id, data FROM reports WHERE message_id = ?")
            .bind(message_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_issue(&self, issue: &IssueRef) -> Result<Option<Report>> {
        let row = sqlx::query(
            "SELECT report_id, data FROM reports WHERE issue_repo = ? AND issue_number = ?",
        )
        .bind(&issue.repo)
        .bind(issue.number as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode).transpose()
    }

    async fn increment(&self, prefix: &str) -> Result<u64> {
        let num: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO report_nums (identifier, num) VALUES (?, 1)
            ON CONFLICT(identifier) DO UPDATE SET num = num + 1
            RETURNING num
            "#,
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to allocate id for prefix {}", prefix))?;
        Ok(num as u64)
    }
}
