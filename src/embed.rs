//! Rendering of reports into chat embeds and issue text.
//!
//! Colors and labels dispatch on [`ReportKind`] and [`Status`], never on the
//! identifier prefix.

use report_tracker_core::{Attachment, Author, Report, ReportKind, Status};

use crate::chat::{Embed, EmbedFooter};

/// Discord's limit on an embed field value.
pub const FIELD_MAX: usize = 1024;

const ATTACHMENTS_SHOWN: usize = 5;
const RESOLVED_COLOR: u32 = 0x95a5a6;
pub const RELEASE_COLOR: u32 = 0x87d37c;

fn kind_color(kind: ReportKind) -> u32 {
    match kind {
        ReportKind::Bug => 0xe74c3c,
        ReportKind::FeatureRequest => 0x3498db,
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Tally line shown on embeds and issue bodies.
pub fn tally_summary(report: &Report) -> String {
    match report.kind {
        ReportKind::Bug => format!("Verification: {}", report.verification),
        ReportKind::FeatureRequest => format!(
            "Votes: +{} / -{} (score {:+})",
            report.upvotes,
            report.downvotes,
            report.score()
        ),
    }
}

/// Summary or detailed embed for a report.
pub fn report_embed(report: &Report, detailed: bool) -> Embed {
    let color = match report.status {
        Status::Resolved => RESOLVED_COLOR,
        _ => kind_color(report.kind),
    };
    let notes = report.attachments.len();
    let description = if detailed {
        format!("*{} notes, showing first {}*", notes, ATTACHMENTS_SHOWN)
    } else {
        format!("*{} notes*", notes)
    };

    let mut embed = Embed {
        title: Some(format!("`{}` {}", report.report_id, report.title)),
        description: Some(description),
        url: report.issue.as_ref().map(|i| i.html_url()),
        color: Some(color),
        footer: Some(EmbedFooter {
            text: format!("Use ~report {} for details.", report.report_id),
        }),
        ..Embed::default()
    }
    .field("Added By", report.reporter.to_string(), true)
    .field("Priority", report.status.display(), true);

    embed = match report.kind {
        ReportKind::Bug => embed.field("Verification", report.verification.to_string(), true),
        ReportKind::FeatureRequest => embed.field(
            "Votes",
            format!("+{} / -{}", report.upvotes, report.downvotes),
            true,
        ),
    };

    if detailed {
        for attachment in report.attachments.iter().take(ATTACHMENTS_SHOWN) {
            embed = embed.field(
                format!("{} {}", attachment.kind.emoji(), attachment.author),
                attachment_text(attachment),
                false,
            );
        }
    }
    embed
}

/// Compact embed posted for inline `#ID` references: the body replaces the
/// note count and the footer is dropped.
pub fn inline_embed(report: &Report) -> Embed {
    let mut embed = report_embed(report, false);
    embed.footer = None;
    embed.description = Some(truncate(report.body(), 2048));
    embed
}

fn attachment_text(attachment: &Attachment) -> String {
    match attachment.message.as_deref() {
        Some(m) => truncate(m, FIELD_MAX - 4),
        None => "No details.".to_string(),
    }
}

/// Plain-text name for an author on the issue tracker, where chat mentions
/// do not render.
pub fn author_label(author: &Author) -> String {
    match author {
        Author::User(id) => format!("Discord user {}", id),
        Author::External(label) => label.clone(),
    }
}

/// Issue body: the original report text followed by the tally summary.
pub fn issue_body(report: &Report) -> String {
    format!(
        "{}\n\n---\nReported by {} as `{}`. {}",
        report.body(),
        author_label(&report.reporter),
        report.report_id,
        tally_summary(report)
    )
}

/// Issue comment mirroring a chat-side attachment.
pub fn attachment_comment(attachment: &Attachment) -> String {
    let mut out = format!(
        "**{}** from {}",
        attachment.kind.title(),
        author_label(&attachment.author)
    );
    if let Some(m) = attachment.message.as_deref() {
        out.push_str("\n\n");
        out.push_str(m);
    }
    out
}

/// One leaderboard line, with a jump link when the tracker message is known.
pub fn top_line(report: &Report, jump_url: Option<&str>) -> String {
    match jump_url {
        Some(url) => format!(
            "`{:+}` [`{}` {}]({})",
            report.score(),
            report.report_id,
            report.title,
            url
        ),
        None => format!("`{:+}` `{}` {}", report.score(), report.report_id, report.title),
    }
}

/// Short listing used for search candidates.
pub fn list_line(report: &Report) -> String {
    format!(
        "`{}` {} ({})",
        report.report_id,
        report.title,
        report.status.display()
    )
}

/// Accumulates lines into chunks no longer than [`FIELD_MAX`].
#[derive(Debug, Default)]
pub struct Paginator {
    pages: Vec<String>,
    current: String,
}

impl Paginator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line. Lines longer than a page are truncated.
    pub fn add(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let line = truncate(line, FIELD_MAX);
        let needed = if self.current.is_empty() {
            line.chars().count()
        } else {
            self.current.chars().count() + 1 + line.chars().count()
        };
        if needed > FIELD_MAX {
            self.pages.push(std::mem::take(&mut self.current));
        }
        if !self.current.is_empty() {
            self.current.push('\n');
        }
        self.current.push_str(&line);
    }

    pub fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }

    /// First page becomes the description, the rest untitled fields.
    pub fn into_embed(self, mut embed: Embed) -> Embed {
        let mut pages = self.finish().into_iter();
        if let Some(first) = pages.next() {
            embed.description = Some(first);
        }
        for page in pages {
            embed = embed.field("** **", page, false);
        }
        embed
    }
}

/// Changelog line for a report resolved by a release.
pub fn changelog_line(report: &Report) -> String {
    let action = match report.kind {
        ReportKind::Bug => "Fixed",
        ReportKind::FeatureRequest => "Added",
    };
    match &report.issue {
        Some(issue) => format!(
            "- {} [`{}`]({}) {}",
            action,
            report.report_id,
            issue.html_url(),
            report.title
        ),
        None => format!("- {} `{}` {}", action, report.report_id, report.title),
    }
}
