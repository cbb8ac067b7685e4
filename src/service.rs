//! The tracker service: every report operation, end to end.
//!
//! [`Tracker`] is constructed once at startup and shared by every handler
//! (commands, reactions, webhooks, CLI). It owns the store, the lifecycle
//! controller, and the per-report locks.
//!
//! Each mutating operation follows the same shape:
//!
//! 1. take the report's lock
//! 2. load it from the store
//! 3. apply the rule-engine mutation (validation failures return here,
//!    before anything changed)
//! 4. fan out side effects through [`Lifecycle`] (best-effort)
//! 5. commit with a full overwrite

use std::sync::Arc;

use report_tracker_core::error::Result;
use report_tracker_core::ids::{is_valid_prefix, next_report_id, normalize_report_id};
use report_tracker_core::rules::{CastOutcome, ResolveOptions};
use report_tracker_core::store::{ReportFilter, ReportStore};
use report_tracker_core::{
    AttachmentKind, Author, IssueRef, MessageRef, Report, ReportError, ReportKind, Severity,
    UserId,
};

use crate::chat::ChatPlatform;
use crate::config::Config;
use crate::embed::{self, Paginator};
use crate::github::IssueTracker;
use crate::lifecycle::Lifecycle;
use crate::locks::ReportLocks;
use crate::search::{search_reports, SearchOutcome};

/// Note appended when an owner rejects a feature request outright.
pub const DENIAL_NOTE: &str = "Feature request denied.";

/// Upper bound for [`Tracker::top`].
pub const TOP_MAX: usize = 20;

/// Input for [`Tracker::create_report`].
#[derive(Debug, Clone)]
pub struct NewReport {
    pub prefix: String,
    pub kind: ReportKind,
    pub title: String,
    pub reporter: Author,
    pub body: String,
    pub repo: String,
    /// Pre-existing external issue, when the report is created from one.
    pub issue: Option<IssueRef>,
    pub severity: Severity,
}

/// Per-id tally of a batch pending/unpending request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub updated: usize,
    pub not_found: usize,
    /// Ids that exist but could not change (resolved, or not pending).
    pub skipped: usize,
}

/// Result of a release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseSummary {
    pub build: String,
    pub resolved: Vec<String>,
    /// Changelog split into embed-sized pages.
    pub changelog: Vec<String>,
}

pub struct Tracker {
    config: Arc<Config>,
    store: Arc<dyn ReportStore>,
    lifecycle: Lifecycle,
    locks: ReportLocks,
}

/// Whether `outcome` moved the score across any of `thresholds` in either direction.
fn tier_changed(outcome: &CastOutcome, thresholds: &[i64]) -> bool {
    thresholds
        .iter()
        .any(|t| (outcome.score_before >= *t) != (outcome.score_after >= *t))
}

impl Tracker {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ReportStore>,
        chat: Arc<dyn ChatPlatform>,
        issues: Arc<dyn IssueTracker>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(chat, issues, config.clone()),
            config,
            store,
            locks: ReportLocks::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn ReportStore {
        self.store.as_ref()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn load(&self, report_id: &str) -> Result<Report> {
        self.store
            .get(report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))
    }

    /// Look up a report by user-supplied id (`avr-17`, `#AVR-017`).
    pub async fn get_report(&self, input: &str) -> Result<Report> {
        self.load(&normalize_report_id(input)).await
    }

    pub async fn report_for_message(&self, message_id: u64) -> Result<Option<Report>> {
        Ok(self.store.find_by_message(message_id).await?)
    }

    pub async fn report_for_issue(&self, issue: &IssueRef) -> Result<Option<Report>> {
        Ok(self.store.find_by_issue(issue).await?)
    }

    /// Lock, load, mutate, refresh the tracker message, commit.
    async fn update_with<F>(&self, report_id: &str, mutate: F) -> Result<Report>
    where
        F: FnOnce(&mut Report) -> Result<()> + Send,
    {
        let _guard = self.locks.lock(report_id).await;
        let mut report = self.load(report_id).await?;
        mutate(&mut report)?;
        self.lifecycle.refresh(&mut report).await;
        self.store.put(&report).await?;
        Ok(report)
    }

    /// Allocate an id, publish the tracker message, and commit a new report.
    ///
    /// A failed publish is logged and the report is committed anyway; a
    /// later refresh republishes it if it is linked to an issue.
    pub async fn create_report(&self, new: NewReport) -> Result<Report> {
        if !is_valid_prefix(&new.prefix) {
            return Err(ReportError::InvalidIdentifier(new.prefix));
        }
        let report_id = next_report_id(self.store.as_ref(), &new.prefix).await?;
        let _guard = self.locks.lock(&report_id).await;

        let mut report = Report::new(
            report_id,
            new.kind,
            new.title,
            new.reporter,
            new.body,
            new.repo,
        );
        report.issue = new.issue;
        if new.severity.is_classified() {
            report.reclassify(new.severity)?;
        }

        if let Err(e) = self.lifecycle.publish(&mut report).await {
            tracing::warn!(report_id = %report.report_id, error = %e, "initial publish failed");
        }
        self.store.put(&report).await?;
        tracing::info!(report_id = %report.report_id, kind = report.kind.as_str(), "report created");
        Ok(report)
    }

    /// Append a note or vote.
    ///
    /// With `mirror`, the attachment is also posted as a comment on the
    /// linked issue; the webhook bridge passes `false` so comments that
    /// came from the issue tracker are not echoed back.
    pub async fn cast(
        &self,
        input: &str,
        author: Author,
        kind: AttachmentKind,
        message: Option<String>,
        mirror: bool,
    ) -> Result<(Report, CastOutcome)> {
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;

        let outcome = report.cast(author.clone(), kind, message)?;

        if mirror {
            if let Some(attachment) = report.attachments.last().cloned() {
                self.lifecycle.mirror_attachment(&report, &attachment).await;
            }
        }

        let mut mirrored_now = false;
        if report.kind == ReportKind::FeatureRequest && kind.is_tally() {
            let voting = &self.config.voting;
            if outcome.crossed(voting.mirror_threshold) && report.issue.is_none() {
                match self.lifecycle.mirror_to_tracker(&mut report).await {
                    Ok(_) => mirrored_now = true,
                    Err(e) => {
                        tracing::warn!(report_id = %report.report_id, error = %e, "automatic mirror failed")
                    }
                }
            } else if tier_changed(&outcome, &voting.relabel_thresholds) {
                self.lifecycle.sync_labels(&report).await;
            }
        }
        if kind.is_tally() && !mirrored_now {
            self.lifecycle.sync_body(&report).await;
        }

        self.lifecycle.refresh(&mut report).await;

        let text = format!(
            "`{}` - {}: {} from {}",
            report.report_id,
            report.title,
            kind.title(),
            author
        );
        self.lifecycle
            .notify_subscribers(&report, &text, author.user_id())
            .await;

        self.store.put(&report).await?;
        Ok((report, outcome))
    }

    pub async fn add_note(
        &self,
        input: &str,
        author: Author,
        message: String,
        mirror: bool,
    ) -> Result<Report> {
        self.cast(input, author, AttachmentKind::Note, Some(message), mirror)
            .await
            .map(|(r, _)| r)
    }

    async fn after_resolve(
        &self,
        report: &mut Report,
        detached: Option<MessageRef>,
        note: Option<&str>,
        close_issue: bool,
        actor: Option<UserId>,
    ) {
        if let Some(message) = detached {
            self.lifecycle
                .delete_message(&report.report_id, message)
                .await;
        }
        if close_issue {
            self.lifecycle.sync_labels(report).await;
            self.lifecycle.close_issue(report, note).await;
        }
        let text = match note {
            Some(n) => format!("`{}` - {} was resolved: {}", report.report_id, report.title, n),
            None => format!("`{}` - {} was resolved.", report.report_id, report.title),
        };
        self.lifecycle.notify_subscribers(report, &text, actor).await;
        tracing::info!(report_id = %report.report_id, "report resolved");
    }

    /// Resolve an open or pending report.
    ///
    /// The tracker message is deleted. With `close_issue`, the linked issue
    /// is closed too; the bridge passes `false` because the issue already is.
    pub async fn resolve(
        &self,
        input: &str,
        author: Author,
        note: Option<String>,
        close_issue: bool,
    ) -> Result<Report> {
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;

        let detached = report.resolve(author.clone(), note.clone(), ResolveOptions::default())?;
        self.after_resolve(
            &mut report,
            detached,
            note.as_deref(),
            close_issue,
            author.user_id(),
        )
        .await;

        self.store.put(&report).await?;
        Ok(report)
    }

    /// Reopen a resolved report: severity resets and the tracker message is recreated.
    pub async fn unresolve(
        &self,
        input: &str,
        author: Author,
        note: Option<String>,
        reopen_issue: bool,
    ) -> Result<Report> {
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;

        report.unresolve(author.clone(), note.clone())?;

        if reopen_issue {
            self.lifecycle.reopen_issue(&report, note.as_deref()).await;
            self.lifecycle.sync_labels(&report).await;
        }
        if let Err(e) = self.lifecycle.publish(&mut report).await {
            tracing::warn!(report_id = %report.report_id, error = %e, "republish failed");
        }
        let text = format!("`{}` - {} was reopened.", report.report_id, report.title);
        self.lifecycle
            .notify_subscribers(&report, &text, author.user_id())
            .await;
        tracing::info!(report_id = %report.report_id, "report reopened");

        self.store.put(&report).await?;
        Ok(report)
    }

    /// Change priority, optionally recording why.
    pub async fn set_priority(
        &self,
        input: &str,
        author: Author,
        rank: i64,
        note: Option<String>,
    ) -> Result<Report> {
        let severity = Severity::new(rank)?;
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;

        report.reclassify(severity)?;
        if let Some(msg) = note.filter(|n| !n.trim().is_empty()) {
            report.add_note(author, format!("Priority changed to {} - {}", rank, msg))?;
        }

        self.lifecycle.sync_labels(&report).await;
        self.lifecycle.refresh(&mut report).await;
        self.store.put(&report).await?;
        Ok(report)
    }

    /// Set severity from the issue tracker without touching the issue.
    pub async fn apply_severity(&self, report_id: &str, severity: Severity) -> Result<Report> {
        self.update_with(report_id, |r| r.reclassify(severity)).await
    }

    /// Set the title from the issue tracker without touching the issue.
    pub async fn apply_title(&self, report_id: &str, title: String) -> Result<Report> {
        self.update_with(report_id, move |r| {
            r.title = title;
            Ok(())
        })
        .await
    }

    /// Owner rename: the linked issue is retitled `"{id} {title}"`.
    pub async fn rename(&self, input: &str, title: &str) -> Result<Report> {
        let report_id = normalize_report_id(input);
        let title = title.trim().to_string();
        let report = self
            .update_with(&report_id, move |r| {
                r.title = title;
                Ok(())
            })
            .await?;
        self.lifecycle.sync_title(&report).await;
        Ok(report)
    }

    pub async fn mark_pending(&self, inputs: &[String]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for input in inputs {
            let report_id = normalize_report_id(input);
            let changed = self
                .update_with(&report_id, |r| {
                    r.mark_pending()?;
                    Ok(())
                })
                .await;
            match changed {
                Ok(_) => outcome.updated += 1,
                Err(ReportError::NotFound(_)) => outcome.not_found += 1,
                Err(ReportError::InvalidTransition { .. }) => outcome.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    pub async fn unmark_pending(&self, inputs: &[String]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for input in inputs {
            let report_id = normalize_report_id(input);
            let changed = self
                .update_with(&report_id, |r| {
                    if r.unmark_pending() {
                        Ok(())
                    } else {
                        Err(ReportError::transition(&r.report_id, "is not pending"))
                    }
                })
                .await;
            match changed {
                Ok(_) => outcome.updated += 1,
                Err(ReportError::NotFound(_)) => outcome.not_found += 1,
                Err(ReportError::InvalidTransition { .. }) => outcome.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    pub async fn pending_reports(&self) -> Result<Vec<Report>> {
        Ok(self.store.scan(&ReportFilter::pending()).await?)
    }

    /// Resolve every pending report as shipped in `build`.
    pub async fn release(
        &self,
        build: &str,
        message: Option<String>,
        author: Author,
    ) -> Result<ReleaseSummary> {
        let pending = self.store.scan(&ReportFilter::pending()).await?;
        let note = format!("Patched in build {}", build);
        let mut changelog = Paginator::new();
        let mut resolved = Vec::new();

        for candidate in pending {
            let _guard = self.locks.lock(&candidate.report_id).await;
            // Re-read under the lock; it may have changed since the scan.
            let Some(mut report) = self.store.get(&candidate.report_id).await? else {
                continue;
            };
            if !report.status.is_pending() {
                continue;
            }

            let detached = report.resolve(
                author.clone(),
                Some(note.clone()),
                ResolveOptions {
                    ignore_closed: true,
                },
            )?;
            self.after_resolve(&mut report, detached, Some(note.as_str()), true, author.user_id())
                .await;
            self.store.put(&report).await?;

            changelog.add(&embed::changelog_line(&report));
            resolved.push(report.report_id);
        }

        if let Some(msg) = message {
            changelog.add(&msg);
        }
        tracing::info!(build, count = resolved.len(), "release processed");

        Ok(ReleaseSummary {
            build: build.to_string(),
            resolved,
            changelog: changelog.finish(),
        })
    }

    /// Move a report to a new identifier prefix.
    ///
    /// The old report is resolved with a note naming its replacement; the
    /// new one carries over content and the issue link and gets a fresh
    /// tracker message. When a listen channel ties `new_prefix` to a report
    /// kind, the new report takes that kind. Returns `(old, new)`.
    pub async fn reidentify(
        &self,
        input: &str,
        new_prefix: &str,
        author: Author,
    ) -> Result<(Report, Report)> {
        let prefix = new_prefix.trim().to_uppercase();
        if !is_valid_prefix(&prefix) {
            return Err(ReportError::InvalidIdentifier(prefix));
        }
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut old = self.load(&report_id).await?;
        if !old.status.is_open() {
            return Err(ReportError::transition(&old.report_id, "is already closed"));
        }

        let new_id = next_report_id(self.store.as_ref(), &prefix).await?;
        let mut new = old.clone();
        new.report_id = new_id.clone();
        new.message = None;
        new.issue = old.issue.take();
        if let Some(kind) = self.config.kind_for_prefix(&prefix) {
            new.convert_kind(kind);
        }

        let note = format!("Reassigned as `{}`.", new_id);
        let detached = old.resolve(author.clone(), Some(note.clone()), ResolveOptions::default())?;
        self.after_resolve(&mut old, detached, Some(note.as_str()), false, author.user_id())
            .await;
        // Commit the old record first: it releases the issue link.
        self.store.put(&old).await?;

        if let Err(e) = self.lifecycle.publish(&mut new).await {
            tracing::warn!(report_id = %new.report_id, error = %e, "publish after reidentify failed");
        }
        self.lifecycle.sync_labels(&new).await;
        self.lifecycle.sync_title(&new).await;
        self.lifecycle.sync_body(&new).await;
        self.store.put(&new).await?;

        tracing::info!(old = %old.report_id, new = %new.report_id, "report reidentified");
        Ok((old, new))
    }

    fn require_owner(&self, actor: UserId) -> Result<()> {
        if self.config.is_owner(actor) {
            Ok(())
        } else {
            Err(ReportError::PermissionDenied)
        }
    }

    /// Mirror a report to the issue tracker now, regardless of score.
    pub async fn force_accept(&self, input: &str, actor: UserId) -> Result<Report> {
        self.require_owner(actor)?;
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;

        self.lifecycle.mirror_to_tracker(&mut report).await?;
        report.subscribe(actor);
        self.lifecycle.refresh(&mut report).await;
        let text = format!(
            "`{}` - {} was accepted and is now tracked as {}.",
            report.report_id,
            report.title,
            report.issue.as_ref().map(|i| i.to_string()).unwrap_or_default()
        );
        self.lifecycle
            .notify_subscribers(&report, &text, Some(actor))
            .await;

        self.store.put(&report).await?;
        Ok(report)
    }

    /// Resolve a report immediately with [`DENIAL_NOTE`].
    pub async fn force_deny(&self, input: &str, actor: UserId) -> Result<Report> {
        self.require_owner(actor)?;
        self.resolve(input, Author::User(actor), Some(DENIAL_NOTE.to_string()), true)
            .await
    }

    /// Flip `user`'s subscription. Returns the report and whether the user
    /// is now subscribed.
    pub async fn toggle_subscription(&self, input: &str, user: UserId) -> Result<(Report, bool)> {
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;
        let subscribed = if report.subscribers.contains(&user) {
            report.unsubscribe(user);
            false
        } else {
            report.subscribe(user);
            true
        };
        self.store.put(&report).await?;
        Ok((report, subscribed))
    }

    /// Idempotent subscribe. Returns whether anything changed.
    pub async fn subscribe(&self, input: &str, user: UserId) -> Result<bool> {
        self.set_subscription(input, user, true).await
    }

    /// Idempotent unsubscribe. Returns whether anything changed.
    pub async fn unsubscribe(&self, input: &str, user: UserId) -> Result<bool> {
        self.set_subscription(input, user, false).await
    }

    async fn set_subscription(&self, input: &str, user: UserId, on: bool) -> Result<bool> {
        let report_id = normalize_report_id(input);
        let _guard = self.locks.lock(&report_id).await;
        let mut report = self.load(&report_id).await?;
        let changed = if on {
            report.subscribe(user)
        } else {
            report.unsubscribe(user)
        };
        if changed {
            self.store.put(&report).await?;
        }
        Ok(changed)
    }

    /// Remove `user` from every report's subscriber set. Returns the count.
    pub async fn unsubscribe_all(&self, user: UserId) -> Result<usize> {
        let subscribed = self.store.scan(&ReportFilter::subscribed(user)).await?;
        let mut count = 0;
        for report in subscribed {
            match self.unsubscribe(&report.report_id, user).await {
                Ok(true) => count += 1,
                Ok(false) | Err(ReportError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    /// Stop managing a report: delete its tracker message, drop the id
    /// prefix from the linked issue's title, and delete the record.
    pub async fn untrack(&self, report_id: &str) -> Result<Report> {
        let _guard = self.locks.lock(report_id).await;
        let report = self.load(report_id).await?;

        if let Some(message) = report.message {
            self.lifecycle
                .delete_message(&report.report_id, message)
                .await;
        }
        if let Some(issue) = &report.issue {
            self.lifecycle
                .rename_issue(&report.report_id, issue, &report.title)
                .await;
        }
        self.store.delete(&report.report_id).await?;
        tracing::info!(report_id = %report.report_id, "report untracked");
        Ok(report)
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let reports = self.store.scan(&ReportFilter::all()).await?;
        Ok(search_reports(reports, query))
    }

    /// Open feature requests by score, best first, with jump links where
    /// the tracker message still resolves.
    pub async fn top(&self, n: usize) -> Result<Vec<(Report, Option<String>)>> {
        let mut reports = self.store.scan(&ReportFilter::open_features()).await?;
        reports.sort_by(|a, b| b.score().cmp(&a.score()));
        reports.truncate(n.min(TOP_MAX));

        let mut out = Vec::with_capacity(reports.len());
        for report in reports {
            let url = self.lifecycle.jump_url(&report).await;
            out.push((report, url));
        }
        Ok(out)
    }
}
