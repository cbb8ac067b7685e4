//! Vote reactions on tracker messages.
//!
//! Only feature-request tracker messages carry vote reactions. An owner's
//! upvote force-accepts the request and an owner's downvote denies it;
//! everyone else casts an ordinary vote.

use report_tracker_core::{AttachmentKind, ReportError, ReportKind, UserId};
use serde::Deserialize;

use crate::invocation::{Invocation, ReactionInvocation};
use crate::service::Tracker;

/// A reaction added to a message, as relayed by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionEvent {
    pub message_id: u64,
    pub channel_id: u64,
    pub user_id: UserId,
    pub emoji: String,
    #[serde(default)]
    pub user_is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    Ignored,
    Voted(AttachmentKind),
    Accepted,
    Denied,
    /// The vote was refused; the message was sent to the user.
    Rejected(String),
}

pub async fn handle_reaction(
    tracker: &Tracker,
    event: &ReactionEvent,
) -> anyhow::Result<ReactionOutcome> {
    if event.user_is_bot {
        return Ok(ReactionOutcome::Ignored);
    }
    let discord = &tracker.config().discord;
    let up = if event.emoji == discord.upvote_emoji {
        true
    } else if event.emoji == discord.downvote_emoji {
        false
    } else {
        return Ok(ReactionOutcome::Ignored);
    };

    let Some(report) = tracker.report_for_message(event.message_id).await? else {
        return Ok(ReactionOutcome::Ignored);
    };
    if report.kind != ReportKind::FeatureRequest {
        return Ok(ReactionOutcome::Ignored);
    }

    let inv = ReactionInvocation {
        chat: tracker.lifecycle().chat(),
        user: event.user_id,
    };
    let id = report.report_id.as_str();

    let result = if tracker.config().is_owner(event.user_id) {
        if up {
            tracker
                .force_accept(id, event.user_id)
                .await
                .map(|_| ReactionOutcome::Accepted)
        } else {
            tracker
                .force_deny(id, event.user_id)
                .await
                .map(|_| ReactionOutcome::Denied)
        }
    } else {
        let kind = if up {
            AttachmentKind::Upvote
        } else {
            AttachmentKind::Downvote
        };
        tracker
            .cast(id, inv.actor(), kind, None, true)
            .await
            .map(|_| ReactionOutcome::Voted(kind))
    };

    match result {
        Ok(outcome) => Ok(outcome),
        Err(ReportError::Storage(e)) => Err(e),
        Err(e) => {
            let text = e.to_string();
            if let Err(dm) = inv.reply(&text).await {
                tracing::warn!(user = event.user_id, error = %dm, "reaction rejection notice failed");
            }
            Ok(ReactionOutcome::Rejected(text))
        }
    }
}
