//! Vote/verification rule engine and status state machine.
//!
//! Every operation here validates first and mutates second: when a method
//! returns `Err`, the report is untouched. Side effects on the chat platform
//! and the issue tracker are not performed here; callers inspect the
//! returned outcome and fan out.
//!
//! ```text
//!            mark_pending            release / resolve
//!   Open ───────────────▶ PendingPatch ───────────────▶ Resolved
//!    ▲  ◀─────────────── │                                │
//!    │     unmark_pending                                 │
//!    └──────────────────── unresolve (severity reset) ◀───┘
//! ```

use crate::error::{ReportError, Result};
use crate::models::{
    Attachment, AttachmentKind, Author, MessageRef, Report, ReportKind, Severity, Status, UserId,
};

/// Result of appending an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastOutcome {
    pub kind: AttachmentKind,
    /// Score (`upvotes - downvotes`) before the attachment was applied.
    pub score_before: i64,
    pub score_after: i64,
}

impl CastOutcome {
    /// True exactly when this cast moved the score from below `threshold`
    /// to at or above it.
    pub fn crossed(&self, threshold: i64) -> bool {
        self.score_before < threshold && self.score_after >= threshold
    }
}

/// Where a resolution came from, which decides the override behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Re-resolving an already resolved report succeeds instead of failing.
    /// Used by batch release processing.
    pub ignore_closed: bool,
}

impl Report {
    /// Validate and append an attachment, updating the relevant tally.
    ///
    /// Plain notes are always legal. Tally kinds must match the report kind
    /// and each author gets at most one tally-affecting attachment per
    /// report. A user author is subscribed on success.
    pub fn cast(
        &mut self,
        author: Author,
        kind: AttachmentKind,
        message: Option<String>,
    ) -> Result<CastOutcome> {
        if !kind.is_legal_for(self.kind) {
            return Err(ReportError::WrongKindVote {
                report_id: self.report_id.clone(),
                vote: kind,
                kind: self.kind,
            });
        }
        if kind.is_tally() && self.tally_by(&author).is_some() {
            return Err(ReportError::DuplicateVote {
                report_id: self.report_id.clone(),
            });
        }

        let score_before = self.score();
        match kind {
            AttachmentKind::Note => {}
            AttachmentKind::CanReproduce | AttachmentKind::CannotReproduce => {
                self.verification += kind.delta();
            }
            AttachmentKind::Upvote => self.upvotes += 1,
            AttachmentKind::Downvote => self.downvotes += 1,
        }
        if let Some(id) = author.user_id() {
            self.subscribers.insert(id);
        }
        self.attachments.push(Attachment::new(author, kind, message));

        Ok(CastOutcome {
            kind,
            score_before,
            score_after: self.score(),
        })
    }

    pub fn add_note(&mut self, author: Author, message: impl Into<String>) -> Result<CastOutcome> {
        self.cast(author, AttachmentKind::Note, Some(message.into()))
    }

    pub fn can_reproduce(&mut self, author: Author, message: Option<String>) -> Result<CastOutcome> {
        self.cast(author, AttachmentKind::CanReproduce, message)
    }

    pub fn cannot_reproduce(
        &mut self,
        author: Author,
        message: Option<String>,
    ) -> Result<CastOutcome> {
        self.cast(author, AttachmentKind::CannotReproduce, message)
    }

    pub fn upvote(&mut self, author: Author, message: Option<String>) -> Result<CastOutcome> {
        self.cast(author, AttachmentKind::Upvote, message)
    }

    pub fn downvote(&mut self, author: Author, message: Option<String>) -> Result<CastOutcome> {
        self.cast(author, AttachmentKind::Downvote, message)
    }

    /// Transition to `Resolved`.
    ///
    /// Appends `note` (if any) as a Note by `author`, clears the pending
    /// flag, and detaches the tracker message. The detached reference is
    /// returned so the caller can delete it on the platform.
    pub fn resolve(
        &mut self,
        author: Author,
        note: Option<String>,
        opts: ResolveOptions,
    ) -> Result<Option<MessageRef>> {
        if self.status == Status::Resolved && !opts.ignore_closed {
            return Err(ReportError::transition(&self.report_id, "is already closed"));
        }
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            self.attachments.push(Attachment::note(author, note));
        }
        self.status = Status::Resolved;
        Ok(self.message.take())
    }

    /// Transition `Resolved` back to `Open` with severity reset to unclassified.
    pub fn unresolve(&mut self, author: Author, note: Option<String>) -> Result<()> {
        if self.status != Status::Resolved {
            return Err(ReportError::transition(&self.report_id, "is still open"));
        }
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            self.attachments.push(Attachment::note(author, note));
        }
        self.status = Status::open();
        Ok(())
    }

    /// Change the priority of an open or pending report, keeping the pending flag.
    pub fn reclassify(&mut self, severity: Severity) -> Result<()> {
        self.status = match self.status {
            Status::Open { .. } => Status::Open { severity },
            Status::PendingPatch { .. } => Status::PendingPatch { severity },
            Status::Resolved => {
                return Err(ReportError::transition(&self.report_id, "is already closed"))
            }
        };
        Ok(())
    }

    /// Flag the report for the next release. Returns `false` if it already was.
    pub fn mark_pending(&mut self) -> Result<bool> {
        match self.status {
            Status::Open { severity } => {
                self.status = Status::PendingPatch { severity };
                Ok(true)
            }
            Status::PendingPatch { .. } => Ok(false),
            Status::Resolved => Err(ReportError::transition(&self.report_id, "is already closed")),
        }
    }

    /// Clear the release flag. Returns `false` if the report was not pending.
    pub fn unmark_pending(&mut self) -> bool {
        match self.status {
            Status::PendingPatch { severity } => {
                self.status = Status::Open { severity };
                true
            }
            _ => false,
        }
    }

    /// Whether the newest attachment is already this note by this author.
    pub fn repeats_last_note(&self, author: &Author, message: &str) -> bool {
        self.attachments.last().is_some_and(|a| {
            a.kind == AttachmentKind::Note
                && a.author == *author
                && a.message.as_deref() == Some(message)
        })
    }

    /// Switch the report to `kind`.
    ///
    /// Tallies are not legal across kinds, so every existing tally becomes a
    /// Note (keeping its author and text) and the counters restart at zero.
    /// Returns `false` if the report already had that kind.
    pub fn convert_kind(&mut self, kind: ReportKind) -> bool {
        if self.kind == kind {
            return false;
        }
        self.kind = kind;
        for attachment in &mut self.attachments {
            if attachment.kind.is_tally() {
                let label = attachment.kind.title();
                attachment.message = Some(match attachment.message.take() {
                    Some(text) => format!("{}: {}", label, text),
                    None => label.to_string(),
                });
                attachment.kind = AttachmentKind::Note;
            }
        }
        self.verification = 0;
        self.upvotes = 0;
        self.downvotes = 0;
        true
    }

    /// Add a subscriber. Returns `false` if already subscribed.
    pub fn subscribe(&mut self, user: UserId) -> bool {
        self.subscribers.insert(user)
    }

    /// Remove a subscriber. Returns `false` if not subscribed.
    pub fn unsubscribe(&mut self, user: UserId) -> bool {
        self.subscribers.remove(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReportKind, Severity};

    fn bug() -> Report {
        Report::new("AVR-001", ReportKind::Bug, "Crash", Author::User(1), "body", "org/repo")
    }

    fn feature() -> Report {
        Report::new(
            "AFR-001",
            ReportKind::FeatureRequest,
            "Dark mode",
            Author::User(1),
            "please",
            "org/repo",
        )
    }

    #[test]
    fn test_repeats_last_note() {
        let mut r = bug();
        let carol = Author::External("GitHub - carol".into());
        assert!(!r.repeats_last_note(&carol, "me too"));
        r.add_note(carol.clone(), "me too").unwrap();
        assert!(r.repeats_last_note(&carol, "me too"));
        assert!(!r.repeats_last_note(&Author::User(5), "me too"));
        assert!(!r.repeats_last_note(&carol, "other"));
    }

    #[test]
    fn test_convert_kind_demotes_tallies() {
        let mut r = bug();
        r.can_reproduce(Author::User(42), Some("on linux".into())).unwrap();
        r.cannot_reproduce(Author::User(7), None).unwrap();
        let before = r.attachments.len();

        assert!(r.convert_kind(ReportKind::FeatureRequest));
        assert_eq!(r.kind, ReportKind::FeatureRequest);
        assert_eq!(r.attachments.len(), before);
        assert!(r.attachments.iter().all(|a| a.kind == AttachmentKind::Note));
        assert_eq!(r.attachments[1].message.as_deref(), Some("Can Reproduce: on linux"));
        assert_eq!(r.attachments[2].message.as_deref(), Some("Cannot Reproduce"));
        assert_eq!(r.verification, 0);

        // Former verifiers may now vote.
        r.upvote(Author::User(42), None).unwrap();
        assert_eq!(r.score(), 1);
        assert!(!r.convert_kind(ReportKind::FeatureRequest));
    }

    #[test]
    fn test_verification_scenario() {
        let mut r = bug();
        r.can_reproduce(Author::User(42), None).unwrap();
        assert_eq!(r.verification, 1);

        let err = r.can_reproduce(Author::User(42), None).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateVote { .. }));
        assert_eq!(r.verification, 1);

        r.cannot_reproduce(Author::User(7), None).unwrap();
        assert_eq!(r.verification, 0);
    }

    #[test]
    fn test_duplicate_across_tally_kinds() {
        let mut r = bug();
        r.can_reproduce(Author::User(42), None).unwrap();
        let len = r.attachments.len();
        let err = r.cannot_reproduce(Author::User(42), None).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateVote { .. }));
        assert_eq!(r.verification, 1);
        assert_eq!(r.attachments.len(), len);
    }

    #[test]
    fn test_notes_unrestricted() {
        let mut r = bug();
        r.can_reproduce(Author::User(42), None).unwrap();
        r.add_note(Author::User(42), "one").unwrap();
        r.add_note(Author::User(42), "two").unwrap();
        assert_eq!(r.attachments.len(), 4);
        assert_eq!(r.verification, 1);
    }

    #[test]
    fn test_wrong_kind_rejected_without_mutation() {
        let mut r = feature();
        let before = r.clone();
        let err = r.can_reproduce(Author::User(3), None).unwrap_err();
        assert!(matches!(err, ReportError::WrongKindVote { .. }));
        assert_eq!(r, before);

        let mut b = bug();
        assert!(b.upvote(Author::User(3), None).is_err());
        assert_eq!(b.upvotes, 0);
    }

    #[test]
    fn test_score_and_threshold_crossing() {
        let mut r = feature();
        let mut crossings = 0;
        for user in 10..16 {
            let outcome = r.upvote(Author::User(user), None).unwrap();
            if outcome.crossed(5) {
                crossings += 1;
            }
        }
        assert_eq!(r.score(), 6);
        assert_eq!(crossings, 1);

        let outcome = r.downvote(Author::User(99), None).unwrap();
        assert_eq!(outcome.score_before, 6);
        assert_eq!(outcome.score_after, 5);
        assert!(!outcome.crossed(5));
    }

    #[test]
    fn test_downvote_from_five() {
        let mut r = feature();
        r.upvotes = 5;
        r.downvote(Author::User(2), None).unwrap();
        assert_eq!(r.score(), 4);
    }

    #[test]
    fn test_cast_subscribes_user() {
        let mut r = feature();
        r.upvote(Author::User(77), None).unwrap();
        assert!(r.subscribers.contains(&77));
        r.add_note(Author::External("GitHub - x".into()), "hi").unwrap();
        assert_eq!(r.subscribers.len(), 2);
    }

    #[test]
    fn test_resolve_detaches_message_and_rejects_repeat() {
        let mut r = bug();
        r.message = Some(MessageRef {
            channel_id: 1,
            message_id: 2,
        });
        let taken = r
            .resolve(Author::User(1), Some("fixed".into()), ResolveOptions::default())
            .unwrap();
        assert_eq!(taken.map(|m| m.message_id), Some(2));
        assert!(r.message.is_none());
        assert_eq!(r.status, Status::Resolved);
        assert_eq!(r.attachments.last().unwrap().message.as_deref(), Some("fixed"));

        let len = r.attachments.len();
        let err = r
            .resolve(Author::User(1), Some("again".into()), ResolveOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
        assert_eq!(r.attachments.len(), len);

        r.resolve(
            Author::User(1),
            None,
            ResolveOptions {
                ignore_closed: true,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_unresolve_resets_severity() {
        let mut r = bug();
        r.reclassify(Severity::CRITICAL).unwrap();
        r.resolve(Author::User(1), None, ResolveOptions::default())
            .unwrap();
        r.unresolve(Author::User(1), None).unwrap();
        assert_eq!(
            r.status,
            Status::Open {
                severity: Severity::UNCLASSIFIED
            }
        );

        let err = r.unresolve(Author::User(1), None).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pending_toggle_keeps_severity() {
        let mut r = bug();
        r.reclassify(Severity::new(2).unwrap()).unwrap();
        assert!(r.mark_pending().unwrap());
        assert!(!r.mark_pending().unwrap());
        r.reclassify(Severity::new(1).unwrap()).unwrap();
        assert!(r.status.is_pending());
        assert!(r.unmark_pending());
        assert_eq!(r.status.severity(), Some(Severity::new(1).unwrap()));
        assert!(!r.unmark_pending());
    }

    #[test]
    fn test_resolved_rejects_reclassify_and_pending() {
        let mut r = bug();
        r.resolve(Author::User(1), None, ResolveOptions::default())
            .unwrap();
        assert!(r.reclassify(Severity::CRITICAL).is_err());
        assert!(r.mark_pending().is_err());
    }

    #[test]
    fn test_subscription_idempotent() {
        let mut r = bug();
        assert!(r.subscribe(5));
        assert!(!r.subscribe(5));
        assert!(r.unsubscribe(5));
        assert!(!r.unsubscribe(5));
    }
}
