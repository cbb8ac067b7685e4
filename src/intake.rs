//! Chat message intake: new reports and inline references.
//!
//! A message posted in a listen channel whose first line is a report
//! header creates a report:
//!
//! ```text
//! **What is the bug?**: Spell slots reset on reload
//! **Feature Request**: Dark mode
//! ```
//!
//! Any other non-bot message is scanned for `#AVR-001` style references
//! and `##123` issue references, and a summary is posted for each hit.

use std::sync::OnceLock;

use regex::Regex;
use report_tracker_core::ids::{normalize_report_id, parse_report_id};
use report_tracker_core::{Author, IssueRef, MessageRef, Report, ReportKind, Severity, UserId};
use serde::Deserialize;

use crate::chat::MessageContent;
use crate::embed;
use crate::service::{NewReport, Tracker};

/// At most this many references are expanded per message.
const MAX_REFERENCES: usize = 5;

/// A file uploaded with a chat message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadedFile {
    pub filename: String,
    pub url: String,
}

/// A chat message as relayed by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub channel_id: u64,
    pub message_id: u64,
    pub author: UserId,
    #[serde(default)]
    pub author_is_bot: bool,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<UploadedFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Ignored,
    Created(Report),
    /// Number of inline references answered.
    Referenced(usize),
}

fn bug_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\**What is the [Bb]ug\?\**:?\s*(.+?)(?:\n|$)").expect("static regex")
    })
}

fn feature_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\**Feature [Rr]equest\**:?\s*(.+?)(?:\n|$)").expect("static regex")
    })
}

fn report_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^#\w])#([A-Za-z]{2,8}-\d+)\b").expect("static regex"))
}

fn issue_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"##(\d+)\b").expect("static regex"))
}

/// Kind and title from a report header, if the message starts with one.
pub fn parse_header(content: &str) -> Option<(ReportKind, String)> {
    let (kind, caps) = if let Some(c) = bug_header().captures(content) {
        (ReportKind::Bug, c)
    } else {
        (ReportKind::FeatureRequest, feature_header().captures(content)?)
    };
    let title = caps[1].trim_matches(|c: char| c == ' ' || c == '*' || c == '.' || c == '\n');
    if title.is_empty() {
        return None;
    }
    Some((kind, title.to_string()))
}

fn is_image(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    [".png", ".jpg", ".jpeg", ".gif"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Report body: the message text followed by one link per uploaded file.
pub fn report_body(content: &str, files: &[UploadedFile]) -> String {
    let mut body = content.trim().to_string();
    for file in files {
        let bang = if is_image(&file.filename) { "!" } else { "" };
        body.push_str(&format!("\n{}[{}]({})", bang, file.filename, file.url));
    }
    body
}

/// Report ids referenced as `#AVR-001`, normalized and de-duplicated.
pub fn report_references(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in report_reference().captures_iter(content) {
        let id = normalize_report_id(&caps[1]);
        if parse_report_id(&id).is_some() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Issue numbers referenced as `##123`.
pub fn issue_references(content: &str) -> Vec<u64> {
    let mut out: Vec<u64> = Vec::new();
    for caps in issue_reference().captures_iter(content) {
        if let Ok(n) = caps[1].parse() {
            if !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}

/// Handle one relayed chat message.
pub async fn handle_message(tracker: &Tracker, msg: &IncomingMessage) -> anyhow::Result<IntakeOutcome> {
    if msg.author_is_bot {
        return Ok(IntakeOutcome::Ignored);
    }

    if let Some(channel) = tracker.config().listen_channel(msg.channel_id) {
        if let Some((kind, title)) = parse_header(&msg.content) {
            if channel.kind.is_some_and(|k| k != kind) {
                tracing::debug!(channel = msg.channel_id, "report kind not accepted in channel");
                return Ok(IntakeOutcome::Ignored);
            }
            let report = tracker
                .create_report(NewReport {
                    prefix: channel.identifier.clone(),
                    kind,
                    title,
                    reporter: Author::User(msg.author),
                    body: report_body(&msg.content, &msg.attachments),
                    repo: channel.repo.clone(),
                    issue: None,
                    severity: Severity::UNCLASSIFIED,
                })
                .await?;
            acknowledge(tracker, msg).await;
            return Ok(IntakeOutcome::Created(report));
        }
    }

    let answered = answer_references(tracker, msg).await;
    if answered == 0 {
        Ok(IntakeOutcome::Ignored)
    } else {
        Ok(IntakeOutcome::Referenced(answered))
    }
}

async fn acknowledge(tracker: &Tracker, msg: &IncomingMessage) {
    let reactions = &tracker.config().discord.ack_reactions;
    if reactions.is_empty() {
        return;
    }
    let emoji = &reactions[(msg.message_id % reactions.len() as u64) as usize];
    let source = MessageRef {
        channel_id: msg.channel_id,
        message_id: msg.message_id,
    };
    if let Err(e) = tracker.lifecycle().chat().add_reaction(&source, emoji).await {
        tracing::warn!(message_id = msg.message_id, error = %e, "acknowledgement reaction failed");
    }
}

async fn answer_references(tracker: &Tracker, msg: &IncomingMessage) -> usize {
    let mut found: Vec<Report> = Vec::new();

    for id in report_references(&msg.content) {
        match tracker.store().get(&id).await {
            Ok(Some(report)) => found.push(report),
            Ok(None) => {}
            Err(e) => tracing::warn!(report_id = %id, error = %e, "reference lookup failed"),
        }
    }
    let repo = &tracker.config().github.default_repo;
    for number in issue_references(&msg.content) {
        match tracker.report_for_issue(&IssueRef::new(repo.clone(), number)).await {
            Ok(Some(report)) => {
                if !found.iter().any(|r| r.report_id == report.report_id) {
                    found.push(report);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(issue = number, error = %e, "issue reference lookup failed"),
        }
    }

    found.truncate(MAX_REFERENCES);
    let mut answered = 0;
    for report in &found {
        let content = MessageContent::embed(embed::inline_embed(report));
        match tracker.lifecycle().chat().send(msg.channel_id, &content).await {
            Ok(_) => answered += 1,
            Err(e) => tracing::warn!(report_id = %report.report_id, error = %e, "inline reference failed"),
        }
    }
    answered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bug_header() {
        let (kind, title) =
            parse_header("**What is the bug?**: Spell slots reset on reload.\nSteps: cast").unwrap();
        assert_eq!(kind, ReportKind::Bug);
        assert_eq!(title, "Spell slots reset on reload");
    }

    #[test]
    fn test_parse_feature_header() {
        let (kind, title) = parse_header("Feature request: Dark mode").unwrap();
        assert_eq!(kind, ReportKind::FeatureRequest);
        assert_eq!(title, "Dark mode");
        assert!(parse_header("just chatting").is_none());
        assert!(parse_header("**Feature Request**:   ").is_none());
    }

    #[test]
    fn test_report_body_links_files() {
        let files = vec![
            UploadedFile {
                filename: "shot.PNG".into(),
                url: "https://cdn/shot.PNG".into(),
            },
            UploadedFile {
                filename: "log.txt".into(),
                url: "https://cdn/log.txt".into(),
            },
        ];
        assert_eq!(
            report_body("  broken  ", &files),
            "broken\n![shot.PNG](https://cdn/shot.PNG)\n[log.txt](https://cdn/log.txt)"
        );
    }

    #[test]
    fn test_references() {
        let text = "see #avr-17 and #AVR-017, also ##42 and ##42";
        assert_eq!(report_references(text), vec!["AVR-017".to_string()]);
        assert_eq!(issue_references(text), vec![42]);
        assert!(report_references("##42").is_empty());
    }
}
