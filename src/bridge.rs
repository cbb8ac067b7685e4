//! Issue tracker → local report reconciliation.
//!
//! [`Bridge::handle`] applies one parsed webhook event. Deliveries are
//! at-least-once, so every branch tolerates replays: redundant transitions
//! come back from the rule engine as `InvalidTransition` or `DuplicateVote`
//! and are swallowed at `debug!`, and recently seen delivery ids are
//! skipped outright.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use report_tracker_core::ids::parse_title_prefix;
use report_tracker_core::{IssueRef, Report, ReportError, ReportKind, Severity};

use crate::invocation::{Invocation, WebhookInvocation};
use crate::service::{NewReport, Tracker};
use crate::webhook::{CommentEvent, IssueAction, IssueEvent, WebhookEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeOutcome {
    Ignored,
    Duplicate,
    Created(String),
    Reopened(String),
    Resolved(String),
    MarkedPending(String),
    Reclassified(String),
    Untracked(String),
    Retitled(String),
    Noted(String),
    /// A matching report exists but nothing changed.
    Unchanged,
}

pub struct Bridge {
    tracker: Arc<Tracker>,
    deliveries: Mutex<LruCache<String, ()>>,
}

/// Swallow the rejections a replayed event naturally produces.
fn tolerate(result: Result<Report, ReportError>, ok: BridgeOutcome) -> anyhow::Result<BridgeOutcome> {
    match result {
        Ok(_) => Ok(ok),
        Err(
            e @ (ReportError::InvalidTransition { .. }
            | ReportError::DuplicateVote { .. }
            | ReportError::NotFound(_)),
        ) => {
            tracing::debug!(error = %e, "redundant webhook event ignored");
            Ok(BridgeOutcome::Unchanged)
        }
        Err(e) => Err(e.into()),
    }
}

/// The severity named by the issue's priority labels, if exactly one is present.
pub fn severity_from_labels(labels: &[String]) -> Option<Severity> {
    let mut found = labels.iter().filter_map(|l| Severity::from_label(l));
    let first = found.next()?;
    match found.next() {
        Some(_) => None,
        None => Some(first),
    }
}

impl Bridge {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        let capacity = NonZeroUsize::new(tracker.config().bridge.delivery_log_capacity)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            tracker,
            deliveries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Record a delivery id. Returns `false` if it was already seen.
    fn remember(&self, delivery: &str) -> bool {
        match self.deliveries.lock() {
            Ok(mut seen) => seen.put(delivery.to_string(), ()).is_none(),
            Err(_) => true,
        }
    }

    fn forget(&self, delivery: &str) {
        if let Ok(mut seen) = self.deliveries.lock() {
            seen.pop(delivery);
        }
    }

    pub async fn handle(
        &self,
        delivery: Option<&str>,
        event: WebhookEvent,
    ) -> anyhow::Result<BridgeOutcome> {
        if let Some(id) = delivery {
            if !self.remember(id) {
                tracing::debug!(delivery = id, "duplicate delivery skipped");
                return Ok(BridgeOutcome::Duplicate);
            }
        }

        let result = match event {
            WebhookEvent::Ping => {
                tracing::info!("webhook ping received");
                Ok(BridgeOutcome::Ignored)
            }
            WebhookEvent::Issue(issue) => self.on_issue(issue).await,
            WebhookEvent::Comment(comment) => self.on_comment(comment).await,
            WebhookEvent::Ignored(kind) => {
                tracing::debug!(event = %kind, "ignoring webhook event type");
                Ok(BridgeOutcome::Ignored)
            }
        };

        // A failed delivery may be retried by the sender.
        if result.is_err() {
            if let Some(id) = delivery {
                self.forget(id);
            }
        }
        result
    }

    async fn on_issue(&self, event: IssueEvent) -> anyhow::Result<BridgeOutcome> {
        if event.is_pull_request {
            return Ok(BridgeOutcome::Ignored);
        }
        match event.action {
            IssueAction::Opened | IssueAction::Reopened => self.on_opened(event).await,
            IssueAction::Closed => self.on_closed(event).await,
            IssueAction::Labeled | IssueAction::Unlabeled => self.on_labels(event).await,
            IssueAction::Edited => self.on_edited(event).await,
            IssueAction::Other => Ok(BridgeOutcome::Ignored),
        }
    }

    async fn on_opened(&self, event: IssueEvent) -> anyhow::Result<BridgeOutcome> {
        let gh = &self.tracker.config().github;
        let issue = IssueRef::new(event.repo.clone(), event.number);

        if let Some(report) = self.tracker.report_for_issue(&issue).await? {
            let actor = WebhookInvocation::new(&event.sender).actor();
            let result = self
                .tracker
                .unresolve(&report.report_id, actor, None, false)
                .await;
            return tolerate(result, BridgeOutcome::Reopened(report.report_id));
        }

        if event.action == IssueAction::Opened && event.author == gh.bot_login {
            return Ok(BridgeOutcome::Ignored);
        }
        if event.has_label(&gh.exempt_label) {
            tracing::debug!(issue = %issue, "exempt issue not tracked");
            return Ok(BridgeOutcome::Ignored);
        }

        // A leading `PREFIX-123` token only counts when the prefix is configured.
        let recovered = parse_title_prefix(&event.title)
            .filter(|p| self.tracker.config().is_known_prefix(p.prefix));
        let (prefix, rest) = match (recovered, gh.prefix_for_repo(&event.repo)) {
            (Some(p), _) => (p.prefix.to_string(), p.rest.trim().to_string()),
            (None, Some(prefix)) => (prefix.to_string(), event.title.trim().to_string()),
            (None, None) => {
                tracing::debug!(issue = %issue, "no identifier for issue; not tracked");
                return Ok(BridgeOutcome::Ignored);
            }
        };

        let kind = if event.has_label(&gh.feature_label) {
            ReportKind::FeatureRequest
        } else {
            self.tracker
                .config()
                .kind_for_prefix(&prefix)
                .unwrap_or(ReportKind::Bug)
        };
        let report = self
            .tracker
            .create_report(NewReport {
                prefix,
                kind,
                title: rest,
                reporter: WebhookInvocation::new(&event.author).actor(),
                body: event.body.clone(),
                repo: event.repo.clone(),
                issue: Some(issue.clone()),
                severity: severity_from_labels(&event.labels).unwrap_or_default(),
            })
            .await?;

        let lifecycle = self.tracker.lifecycle();
        let title = format!("{} {}", report.report_id, report.title);
        if title != event.title {
            lifecycle
                .rename_issue(&report.report_id, &issue, &title)
                .await;
        }
        lifecycle
            .comment(
                &report.report_id,
                &issue,
                &format!("Tracked as `{}`.", report.report_id),
            )
            .await;
        tracing::info!(report_id = %report.report_id, issue = %issue, "report created from issue");
        Ok(BridgeOutcome::Created(report.report_id))
    }

    async fn on_closed(&self, event: IssueEvent) -> anyhow::Result<BridgeOutcome> {
        let issue = IssueRef::new(event.repo.clone(), event.number);
        let Some(report) = self.tracker.report_for_issue(&issue).await? else {
            return Ok(BridgeOutcome::Ignored);
        };
        let id = report.report_id;

        let owner = self.tracker.config().github.owner_login.as_deref();
        if owner == Some(event.sender.as_str()) {
            let outcome = self.tracker.mark_pending(std::slice::from_ref(&id)).await?;
            return Ok(if outcome.updated > 0 {
                BridgeOutcome::MarkedPending(id)
            } else {
                BridgeOutcome::Unchanged
            });
        }

        let actor = WebhookInvocation::new(&event.sender).actor();
        let result = self.tracker.resolve(&id, actor, None, false).await;
        tolerate(result, BridgeOutcome::Resolved(id))
    }

    async fn on_labels(&self, event: IssueEvent) -> anyhow::Result<BridgeOutcome> {
        if !event.is_open {
            return Ok(BridgeOutcome::Ignored);
        }
        let delay = self.tracker.config().bridge.label_delay_ms;
        if delay > 0 {
            // Let a concurrent "opened" delivery for a new issue commit first.
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let issue = IssueRef::new(event.repo.clone(), event.number);
        let Some(report) = self.tracker.report_for_issue(&issue).await? else {
            return Ok(BridgeOutcome::Ignored);
        };
        let id = report.report_id.clone();

        if event.has_label(&self.tracker.config().github.exempt_label) {
            let result = self.tracker.untrack(&id).await;
            return tolerate(result, BridgeOutcome::Untracked(id));
        }

        match severity_from_labels(&event.labels) {
            Some(severity) if report.status.severity() != Some(severity) => {
                let result = self.tracker.apply_severity(&id, severity).await;
                tolerate(result, BridgeOutcome::Reclassified(id))
            }
            _ => Ok(BridgeOutcome::Unchanged),
        }
    }

    async fn on_edited(&self, event: IssueEvent) -> anyhow::Result<BridgeOutcome> {
        let issue = IssueRef::new(event.repo.clone(), event.number);
        let Some(report) = self.tracker.report_for_issue(&issue).await? else {
            return Ok(BridgeOutcome::Ignored);
        };
        let title = match parse_title_prefix(&event.title) {
            Some(p) if p.prefix == report.prefix() => p.rest.trim().to_string(),
            _ => event.title.trim().to_string(),
        };
        if title.is_empty() || title == report.title {
            return Ok(BridgeOutcome::Unchanged);
        }
        let id = report.report_id;
        let result = self.tracker.apply_title(&id, title).await;
        tolerate(result, BridgeOutcome::Retitled(id))
    }

    async fn on_comment(&self, event: CommentEvent) -> anyhow::Result<BridgeOutcome> {
        if event.action != "created" || event.author == self.tracker.config().github.bot_login {
            return Ok(BridgeOutcome::Ignored);
        }
        let issue = IssueRef::new(event.repo.clone(), event.number);
        let Some(report) = self.tracker.report_for_issue(&issue).await? else {
            return Ok(BridgeOutcome::Ignored);
        };
        let actor = WebhookInvocation::new(&event.author).actor();
        // Redeliveries without a usable delivery id land here.
        if report.repeats_last_note(&actor, &event.body) {
            tracing::debug!(report_id = %report.report_id, "repeated comment skipped");
            return Ok(BridgeOutcome::Duplicate);
        }
        let id = report.report_id;
        let result = self.tracker.add_note(&id, actor, event.body, false).await;
        tolerate(result, BridgeOutcome::Noted(id))
    }
}
