//! Issue-tracker webhook payloads and signature verification.
//!
//! Raw GitHub payloads are parsed into [`WebhookEvent`], a normalized form
//! that only carries the fields the bridge reconciles on.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: Login,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssuesPayload {
    action: String,
    issue: IssuePayload,
    repository: Repository,
    sender: Login,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    body: String,
    user: Login,
}

#[derive(Debug, Deserialize)]
struct IssueCommentPayload {
    action: String,
    issue: IssuePayload,
    comment: CommentPayload,
    repository: Repository,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    Opened,
    Reopened,
    Closed,
    Labeled,
    Unlabeled,
    Edited,
    Other,
}

impl IssueAction {
    fn parse(action: &str) -> Self {
        match action {
            "opened" => IssueAction::Opened,
            "reopened" => IssueAction::Reopened,
            "closed" => IssueAction::Closed,
            "labeled" => IssueAction::Labeled,
            "unlabeled" => IssueAction::Unlabeled,
            "edited" => IssueAction::Edited,
            _ => IssueAction::Other,
        }
    }
}

/// An `issues` event.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueEvent {
    pub repo: String,
    pub number: u64,
    pub action: IssueAction,
    /// Who performed the action.
    pub sender: String,
    /// Who opened the issue.
    pub author: String,
    pub labels: Vec<String>,
    pub title: String,
    pub body: String,
    pub is_pull_request: bool,
    pub is_open: bool,
}

impl IssueEvent {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// An `issue_comment` event.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentEvent {
    pub repo: String,
    pub number: u64,
    pub action: String,
    pub author: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Ping,
    Issue(IssueEvent),
    Comment(CommentEvent),
    /// An event type the bridge does not handle.
    Ignored(String),
}

/// Parse a webhook body given its `X-GitHub-Event` type.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
    match event_type {
        "ping" => Ok(WebhookEvent::Ping),
        "issues" => {
            let p: IssuesPayload = serde_json::from_slice(body)?;
            Ok(WebhookEvent::Issue(IssueEvent {
                repo: p.repository.full_name,
                number: p.issue.number,
                action: IssueAction::parse(&p.action),
                sender: p.sender.login,
                author: p.issue.user.login,
                labels: p.issue.labels.into_iter().map(|l| l.name).collect(),
                title: p.issue.title,
                body: p.issue.body.unwrap_or_default(),
                is_pull_request: p.issue.pull_request.is_some(),
                is_open: p.issue.state.as_deref() != Some("closed"),
            }))
        }
        "issue_comment" => {
            let p: IssueCommentPayload = serde_json::from_slice(body)?;
            Ok(WebhookEvent::Comment(CommentEvent {
                repo: p.repository.full_name,
                number: p.issue.number,
                action: p.action,
                author: p.comment.user.login,
                body: p.comment.body,
            }))
        }
        other => Ok(WebhookEvent::Ignored(other.to_string())),
    }
}

/// Check an `X-Hub-Signature-256` header against the shared secret.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), String> {
    let signature = header.ok_or_else(|| "Missing X-Hub-Signature-256 header".to_string())?;
    let signature = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| "Invalid signature format".to_string())?;
    let signature = hex::decode(signature).map_err(|_| "Invalid hex in signature".to_string())?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| "Invalid secret key".to_string())?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| "Signature mismatch".to_string())
}

/// `sha256=<hex>` signature for `body`, as the sender computes it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUES: &str = r#"{
        "action": "labeled",
        "issue": {
            "number": 12,
            "title": "AVR-003 Crash on load",
            "body": null,
            "user": {"login": "alice"},
            "labels": [{"name": "bug"}, {"name": "P1: Very High"}],
            "state": "open"
        },
        "repository": {"full_name": "org/repo"},
        "sender": {"login": "bob"}
    }"#;

    #[test]
    fn test_parse_issue_event() {
        let event = parse_event("issues", ISSUES.as_bytes()).unwrap();
        let WebhookEvent::Issue(issue) = event else {
            panic!("expected issue event");
        };
        assert_eq!(issue.repo, "org/repo");
        assert_eq!(issue.number, 12);
        assert_eq!(issue.action, IssueAction::Labeled);
        assert_eq!(issue.sender, "bob");
        assert_eq!(issue.author, "alice");
        assert!(issue.has_label("P1: Very High"));
        assert_eq!(issue.body, "");
        assert!(issue.is_open);
        assert!(!issue.is_pull_request);
    }

    #[test]
    fn test_parse_comment_event() {
        let body = r#"{
            "action": "created",
            "issue": {"number": 4, "title": "t", "user": {"login": "alice"}},
            "comment": {"body": "same here", "user": {"login": "carol"}},
            "repository": {"full_name": "org/repo"}
        }"#;
        match parse_event("issue_comment", body.as_bytes()).unwrap() {
            WebhookEvent::Comment(c) => {
                assert_eq!(c.number, 4);
                assert_eq!(c.author, "carol");
                assert_eq!(c.body, "same here");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            parse_event("push", b"{}").unwrap(),
            WebhookEvent::Ignored("push".into())
        );
        assert!(parse_event("issues", b"{}").is_err());
    }

    #[test]
    fn test_signature_round_trip() {
        let header = sign("s3cret", b"payload");
        assert!(verify_signature("s3cret", b"payload", Some(&header)).is_ok());
        assert!(verify_signature("other", b"payload", Some(&header)).is_err());
        assert!(verify_signature("s3cret", b"payload", Some("abc")).is_err());
        assert!(verify_signature("s3cret", b"payload", None).is_err());
    }
}
