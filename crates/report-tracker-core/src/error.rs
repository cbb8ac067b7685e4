//! Error taxonomy for report operations.
//!
//! Validation errors ([`ReportError::InvalidTransition`],
//! [`ReportError::DuplicateVote`], [`ReportError::WrongKindVote`], ...) are
//! raised before any field of a report is touched, so a failed call leaves
//! the report exactly as it was.

use thiserror::Error;

use crate::models::{AttachmentKind, ReportKind};

/// Result alias used throughout the rule engine and service layer.
pub type Result<T, E = ReportError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ReportError {
    /// Lookup by report id, message id, or issue reference failed.
    #[error("Report not found: {0}")]
    NotFound(String),

    /// The requested status change is not legal from the current status.
    #[error("`{report_id}` {reason}.")]
    InvalidTransition {
        report_id: String,
        reason: &'static str,
    },

    /// The author already cast a tally-affecting attachment on this report.
    #[error("You have already verified/upvoted/downvoted `{report_id}`.")]
    DuplicateVote { report_id: String },

    /// The attachment kind is not legal for the report kind.
    #[error("You cannot {} a {}.", .vote.verb(), .kind.noun())]
    WrongKindVote {
        report_id: String,
        vote: AttachmentKind,
        kind: ReportKind,
    },

    /// Priority rank outside `0..=6`.
    #[error("Invalid priority {0}: must be between 0 and 6.")]
    InvalidSeverity(i64),

    /// Identifier prefix is not 2-8 uppercase ASCII letters.
    #[error("`{0}` is not a valid identifier.")]
    InvalidIdentifier(String),

    /// The report already has a linked external issue.
    #[error("`{report_id}` is already linked to {issue}.")]
    AlreadyMirrored { report_id: String, issue: String },

    /// The acting user may not run a privileged action.
    #[error("Only the bot owner may do that.")]
    PermissionDenied,

    /// An external call that was the entire point of the operation failed.
    #[error("External service unavailable: {0}")]
    ExternalUnavailable(String),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ReportError {
    /// Whether this error should be shown verbatim to the invoking user.
    ///
    /// Storage failures are internal and surface as a generic message.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ReportError::Storage(_))
    }

    pub fn transition(report_id: &str, reason: &'static str) -> Self {
        ReportError::InvalidTransition {
            report_id: report_id.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_kind_messages() {
        let cr = ReportError::WrongKindVote {
            report_id: "AFR-001".into(),
            vote: AttachmentKind::CanReproduce,
            kind: ReportKind::FeatureRequest,
        };
        assert_eq!(cr.to_string(), "You cannot CR a feature request.");

        let up = ReportError::WrongKindVote {
            report_id: "AVR-001".into(),
            vote: AttachmentKind::Upvote,
            kind: ReportKind::Bug,
        };
        assert_eq!(up.to_string(), "You cannot upvote a bug report.");
    }

    #[test]
    fn test_storage_not_user_facing() {
        let err = ReportError::from(anyhow::anyhow!("disk full"));
        assert!(!err.is_user_facing());
        assert!(ReportError::NotFound("AVR-404".into()).is_user_facing());
    }
}
