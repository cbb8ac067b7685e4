//! Core data models for tracked reports.
//!
//! A [`Report`] is the aggregate record: identity, classification, status,
//! tallies, an append-only attachment log, a subscriber set, and its links
//! to the chat platform and the external issue tracker.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Chat-platform user identifier (a Discord snowflake).
pub type UserId = u64;

/// Whether a report is a bug or a feature request.
///
/// Set once at creation; every kind-dependent behavior (legal votes, labels,
/// embed color) dispatches on this value, never on the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Bug,
    FeatureRequest,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Bug => "bug",
            ReportKind::FeatureRequest => "feature_request",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            ReportKind::Bug => "bug report",
            ReportKind::FeatureRequest => "feature request",
        }
    }

    /// Tally-affecting attachment kinds legal for this report kind.
    pub fn tally_kinds(&self) -> [AttachmentKind; 2] {
        match self {
            ReportKind::Bug => [AttachmentKind::CanReproduce, AttachmentKind::CannotReproduce],
            ReportKind::FeatureRequest => [AttachmentKind::Upvote, AttachmentKind::Downvote],
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bug" => Ok(ReportKind::Bug),
            "feature_request" | "feature" => Ok(ReportKind::FeatureRequest),
            other => Err(format!("unknown report kind: '{}'", other)),
        }
    }
}

/// Priority rank: 0 is most critical, 5 is trivial, 6 is unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Severity(u8);

const SEVERITY_LABELS: [&str; 7] = [
    "P0: Critical",
    "P1: Very High",
    "P2: High",
    "P3: Medium",
    "P4: Low",
    "P5: Trivial",
    "Pending/Other",
];

impl Severity {
    pub const CRITICAL: Severity = Severity(0);
    pub const TRIVIAL: Severity = Severity(5);
    pub const UNCLASSIFIED: Severity = Severity(6);

    pub fn new(rank: i64) -> Result<Self> {
        if (0..=6).contains(&rank) {
            Ok(Severity(rank as u8))
        } else {
            Err(ReportError::InvalidSeverity(rank))
        }
    }

    pub fn rank(&self) -> u8 {
        self.0
    }

    pub fn is_classified(&self) -> bool {
        *self != Severity::UNCLASSIFIED
    }

    /// Display name, which doubles as the issue-tracker label for ranks 0-5.
    pub fn label(&self) -> &'static str {
        SEVERITY_LABELS[self.0 as usize]
    }

    /// Maps an issue-tracker label back to a classified severity.
    pub fn from_label(label: &str) -> Option<Severity> {
        SEVERITY_LABELS[..6]
            .iter()
            .position(|l| *l == label)
            .map(|i| Severity(i as u8))
    }
}

impl TryFrom<i64> for Severity {
    type Error = ReportError;

    fn try_from(rank: i64) -> Result<Self> {
        Severity::new(rank)
    }
}

impl From<Severity> for i64 {
    fn from(severity: Severity) -> i64 {
        severity.0 as i64
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::UNCLASSIFIED
    }
}

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    Open { severity: Severity },
    PendingPatch { severity: Severity },
    Resolved,
}

impl Status {
    pub fn open() -> Self {
        Status::Open {
            severity: Severity::UNCLASSIFIED,
        }
    }

    /// True for both `Open` and `PendingPatch`.
    pub fn is_open(&self) -> bool {
        !matches!(self, Status::Resolved)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Status::PendingPatch { .. })
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            Status::Open { severity } | Status::PendingPatch { severity } => Some(*severity),
            Status::Resolved => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open { .. } => "open",
            Status::PendingPatch { .. } => "pending_patch",
            Status::Resolved => "resolved",
        }
    }

    /// Human-readable priority column for summaries.
    pub fn display(&self) -> &'static str {
        match self {
            Status::Open { severity } => severity.label(),
            Status::PendingPatch { .. } => "Patch Pending",
            Status::Resolved => "Resolved",
        }
    }
}

/// Who wrote an attachment or filed a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    /// A chat-platform user.
    User(UserId),
    /// An external source label, e.g. `"GitHub - octocat"`.
    External(String),
}

impl Author {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Author::User(id) => Some(*id),
            Author::External(_) => None,
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User(id) => write!(f, "<@{}>", id),
            Author::External(label) => f.write_str(label),
        }
    }
}

/// The kind of an [`Attachment`], with its fixed tally delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Note,
    Upvote,
    Downvote,
    CanReproduce,
    CannotReproduce,
}

impl AttachmentKind {
    /// Delta applied to the counter relevant to the report's kind.
    pub fn delta(&self) -> i64 {
        match self {
            AttachmentKind::Note => 0,
            AttachmentKind::Upvote | AttachmentKind::CanReproduce => 1,
            AttachmentKind::Downvote | AttachmentKind::CannotReproduce => -1,
        }
    }

    pub fn is_tally(&self) -> bool {
        !matches!(self, AttachmentKind::Note)
    }

    pub fn is_legal_for(&self, kind: ReportKind) -> bool {
        match self {
            AttachmentKind::Note => true,
            AttachmentKind::CanReproduce | AttachmentKind::CannotReproduce => {
                kind == ReportKind::Bug
            }
            AttachmentKind::Upvote | AttachmentKind::Downvote => {
                kind == ReportKind::FeatureRequest
            }
        }
    }

    /// Verb used in user-facing messages ("You cannot CR a feature request").
    pub fn verb(&self) -> &'static str {
        match self {
            AttachmentKind::Note => "note",
            AttachmentKind::Upvote => "upvote",
            AttachmentKind::Downvote => "downvote",
            AttachmentKind::CanReproduce => "CR",
            AttachmentKind::CannotReproduce => "CNR",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AttachmentKind::Note => "Note",
            AttachmentKind::Upvote => "Upvote",
            AttachmentKind::Downvote => "Downvote",
            AttachmentKind::CanReproduce => "Can Reproduce",
            AttachmentKind::CannotReproduce => "Cannot Reproduce",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AttachmentKind::Note => "\u{2139}",
            AttachmentKind::Upvote => "\u{2b06}",
            AttachmentKind::Downvote => "\u{2b07}",
            AttachmentKind::CanReproduce => "\u{2705}",
            AttachmentKind::CannotReproduce => "\u{274c}",
        }
    }
}

/// One immutable entry in a report's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub author: Author,
    #[serde(default)]
    pub message: Option<String>,
    pub kind: AttachmentKind,
}

impl Attachment {
    pub fn new(author: Author, kind: AttachmentKind, message: Option<String>) -> Self {
        let message = message.filter(|m| !m.trim().is_empty());
        Self {
            author,
            message,
            kind,
        }
    }

    pub fn note(author: Author, message: impl Into<String>) -> Self {
        Self::new(author, AttachmentKind::Note, Some(message.into()))
    }
}

/// Location of a tracker message on the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// A mirrored issue: repository (`owner/name`) plus issue number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/issues/{}", self.repo, self.number)
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// A tracked bug report or feature request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub kind: ReportKind,
    pub title: String,
    pub reporter: Author,
    pub status: Status,
    #[serde(default)]
    pub verification: i64,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(default)]
    pub downvotes: u32,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub subscribers: BTreeSet<UserId>,
    #[serde(default)]
    pub message: Option<MessageRef>,
    /// Repository the report is mirrored into (or will be, once mirrored).
    pub repo: String,
    #[serde(default)]
    pub issue: Option<IssueRef>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Create a fresh, open, unclassified report.
    ///
    /// `body` becomes the first attachment: a Note by the reporter.
    pub fn new(
        report_id: impl Into<String>,
        kind: ReportKind,
        title: impl Into<String>,
        reporter: Author,
        body: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        let mut report = Self {
            report_id: report_id.into(),
            kind,
            title: title.into(),
            reporter: reporter.clone(),
            status: Status::open(),
            verification: 0,
            upvotes: 0,
            downvotes: 0,
            attachments: vec![Attachment::note(reporter.clone(), body)],
            subscribers: BTreeSet::new(),
            message: None,
            repo: repo.into(),
            issue: None,
            created_at: Utc::now(),
        };
        if let Author::User(id) = reporter {
            report.subscribers.insert(id);
        }
        report
    }

    /// `upvotes - downvotes`.
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }

    pub fn is_bug(&self) -> bool {
        self.kind == ReportKind::Bug
    }

    /// Text of the first attachment, the original report body.
    pub fn body(&self) -> &str {
        self.attachments
            .first()
            .and_then(|a| a.message.as_deref())
            .unwrap_or("")
    }

    /// Identifier prefix (`AVR` for `AVR-017`).
    pub fn prefix(&self) -> &str {
        self.report_id
            .split_once('-')
            .map(|(p, _)| p)
            .unwrap_or(&self.report_id)
    }

    /// Tally-affecting attachment already cast by `author`, if any.
    pub fn tally_by(&self, author: &Author) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.kind.is_tally() && &a.author == author)
    }
}
