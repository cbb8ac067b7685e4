//! Cross-system side effects of report changes.
//!
//! [`Lifecycle`] keeps the tracker message on the chat platform and the
//! mirrored issue on the issue tracker consistent with a report's local
//! state. It never persists anything: callers mutate the report, call in
//! here, then commit.
//!
//! Most methods are best-effort. A failed platform call is logged with
//! `warn!` and swallowed so it cannot abort the caller's commit. The
//! exceptions are [`Lifecycle::publish`] and [`Lifecycle::mirror_to_tracker`],
//! which return the failure because the caller may need to surface it.

use std::sync::Arc;

use anyhow::Result;
use report_tracker_core::{
    Attachment, IssueRef, MessageRef, Report, ReportError, ReportKind, UserId,
};

use crate::cache::MessageCache;
use crate::chat::{ChatPlatform, MessageContent};
use crate::config::Config;
use crate::embed;
use crate::github::IssueTracker;

pub struct Lifecycle {
    chat: Arc<dyn ChatPlatform>,
    issues: Arc<dyn IssueTracker>,
    cache: MessageCache,
    config: Arc<Config>,
}

fn logged<T>(what: &str, report_id: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(report_id, error = %e, "{} failed", what);
            None
        }
    }
}

impl Lifecycle {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        issues: Arc<dyn IssueTracker>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            chat,
            issues,
            cache: MessageCache::default(),
            config,
        }
    }

    pub fn chat(&self) -> &dyn ChatPlatform {
        self.chat.as_ref()
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Create the tracker message for an open report that has none.
    ///
    /// No-op for resolved reports and for reports that already have a
    /// message. Feature requests get the two vote reactions, and a
    /// discussion thread is started on the message; both are best-effort.
    pub async fn publish(&self, report: &mut Report) -> Result<Option<MessageRef>> {
        if !report.status.is_open() {
            return Ok(None);
        }
        if report.message.is_some() {
            return Ok(report.message);
        }

        let content = MessageContent::embed(embed::report_embed(report, false));
        let message = self
            .chat
            .send(self.config.discord.tracker_channel, &content)
            .await?;
        report.message = Some(message);
        tracing::info!(report_id = %report.report_id, message_id = message.message_id, "published tracker message");

        if report.kind == ReportKind::FeatureRequest {
            for emoji in [&self.config.discord.upvote_emoji, &self.config.discord.downvote_emoji] {
                logged(
                    "vote reaction",
                    &report.report_id,
                    self.chat.add_reaction(&message, emoji).await,
                );
            }
        }

        let thread_name = format!("{} {}", report.report_id, report.title);
        logged(
            "thread creation",
            &report.report_id,
            self.chat.create_thread(&message, &thread_name).await,
        );

        Ok(Some(message))
    }

    /// Re-render the tracker message. Self-heals a missing message for open,
    /// linked reports by publishing instead.
    pub async fn refresh(&self, report: &mut Report) {
        let message = report.message;
        match message {
            Some(message) => {
                let content = MessageContent::embed(embed::report_embed(report, false));
                logged(
                    "tracker message edit",
                    &report.report_id,
                    self.chat.edit(&message, &content).await,
                );
            }
            None if report.status.is_open() && report.issue.is_some() => {
                let id = report.report_id.clone();
                logged("tracker message publish", &id, self.publish(report).await);
            }
            None => {}
        }
    }

    pub async fn delete_message(&self, report_id: &str, message: MessageRef) {
        self.cache.invalidate(message.message_id);
        logged(
            "tracker message delete",
            report_id,
            self.chat.delete(&message).await,
        );
    }

    /// Labels a linked issue should carry for the report's current state.
    pub fn issue_labels(&self, report: &Report) -> Vec<String> {
        let gh = &self.config.github;
        let mut labels = vec![match report.kind {
            ReportKind::Bug => gh.bug_label.clone(),
            ReportKind::FeatureRequest => gh.feature_label.clone(),
        }];
        if let Some(severity) = report.status.severity().filter(|s| s.is_classified()) {
            labels.push(severity.label().to_string());
        }
        if report.kind == ReportKind::FeatureRequest {
            let score = report.score();
            if let Some(t) = self
                .config
                .voting
                .relabel_thresholds
                .iter()
                .rev()
                .find(|t| score >= **t)
            {
                labels.push(format!("+{}", t));
            }
        }
        labels
    }

    /// Create the external issue for a report.
    ///
    /// Fails with [`ReportError::AlreadyMirrored`] if the report is already
    /// linked, and with [`ReportError::ExternalUnavailable`] if the tracker
    /// call fails. On success the report is linked in memory.
    pub async fn mirror_to_tracker(&self, report: &mut Report) -> Result<IssueRef, ReportError> {
        if let Some(issue) = &report.issue {
            return Err(ReportError::AlreadyMirrored {
                report_id: report.report_id.clone(),
                issue: issue.to_string(),
            });
        }
        let title = format!("{} {}", report.report_id, report.title);
        let body = embed::issue_body(report);
        let labels = self.issue_labels(report);
        let issue = self
            .issues
            .create_issue(&report.repo, &title, &body, &labels)
            .await
            .map_err(|e| ReportError::ExternalUnavailable(e.to_string()))?;
        tracing::info!(report_id = %report.report_id, issue = %issue, "mirrored to issue tracker");
        report.issue = Some(issue.clone());
        Ok(issue)
    }

    pub async fn sync_labels(&self, report: &Report) {
        if let Some(issue) = &report.issue {
            let labels = self.issue_labels(report);
            logged(
                "issue relabel",
                &report.report_id,
                self.issues.relabel(issue, &labels).await,
            );
        }
    }

    pub async fn sync_body(&self, report: &Report) {
        if let Some(issue) = &report.issue {
            logged(
                "issue body sync",
                &report.report_id,
                self.issues.edit_body(issue, &embed::issue_body(report)).await,
            );
        }
    }

    /// Rename the linked issue to `"{id} {title}"`.
    pub async fn sync_title(&self, report: &Report) {
        if let Some(issue) = &report.issue {
            let title = format!("{} {}", report.report_id, report.title);
            logged(
                "issue rename",
                &report.report_id,
                self.issues.rename(issue, &title).await,
            );
        }
    }

    pub async fn rename_issue(&self, report_id: &str, issue: &IssueRef, title: &str) {
        logged("issue rename", report_id, self.issues.rename(issue, title).await);
    }

    pub async fn comment(&self, report_id: &str, issue: &IssueRef, body: &str) {
        logged("issue comment", report_id, self.issues.comment(issue, body).await);
    }

    /// Mirror a chat-side attachment onto the linked issue as a comment.
    pub async fn mirror_attachment(&self, report: &Report, attachment: &Attachment) {
        if let Some(issue) = &report.issue {
            self.comment(&report.report_id, issue, &embed::attachment_comment(attachment))
                .await;
        }
    }

    pub async fn close_issue(&self, report: &Report, comment: Option<&str>) {
        if let Some(issue) = &report.issue {
            logged(
                "issue close",
                &report.report_id,
                self.issues.close(issue, comment).await,
            );
        }
    }

    pub async fn reopen_issue(&self, report: &Report, comment: Option<&str>) {
        if let Some(issue) = &report.issue {
            logged(
                "issue reopen",
                &report.report_id,
                self.issues.reopen(issue, comment).await,
            );
        }
    }

    /// Direct-message every subscriber except `exclude`.
    ///
    /// Each delivery is independent; an unreachable user is logged and the
    /// rest are still notified.
    pub async fn notify_subscribers(&self, report: &Report, text: &str, exclude: Option<UserId>) {
        let content = MessageContent {
            content: Some(text.to_string()),
            embeds: vec![embed::report_embed(report, false)],
        };
        for user in report.subscribers.iter().copied() {
            if Some(user) == exclude {
                continue;
            }
            if let Err(e) = self.chat.dm(user, &content).await {
                tracing::warn!(report_id = %report.report_id, user, error = %e, "subscriber notification failed");
            }
        }
    }

    /// Jump URL of the report's tracker message, if it still resolves.
    pub async fn jump_url(&self, report: &Report) -> Option<String> {
        let reference = report.message?;
        self.cache
            .resolve(self.chat.as_ref(), &reference)
            .await
            .map(|m| m.jump_url())
    }
}
