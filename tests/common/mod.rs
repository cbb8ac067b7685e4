//! Shared fakes for integration tests: a chat platform and an issue tracker
//! that record every call, plus a tracker wired to an in-memory store.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use report_tracker::chat::{ChatMessage, ChatPlatform, MessageContent};
use report_tracker::config::Config;
use report_tracker::github::IssueTracker;
use report_tracker::service::{NewReport, Tracker};
use report_tracker_core::store::memory::InMemoryStore;
use report_tracker_core::{Author, IssueRef, MessageRef, Report, ReportKind, Severity, UserId};

pub const TRACKER_CHANNEL: u64 = 1;
pub const OWNER: UserId = 900;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Send(u64, MessageContent),
    Edit(MessageRef),
    Delete(MessageRef),
    React(MessageRef, String),
    Thread(MessageRef),
    Dm(UserId, MessageContent),
}

#[derive(Default)]
pub struct RecordingChat {
    pub calls: Mutex<Vec<ChatCall>>,
    next_id: AtomicU64,
    pub unreachable: Mutex<HashSet<UserId>>,
    pub down: AtomicBool,
}

impl RecordingChat {
    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn dms_to(&self, user: UserId) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChatCall::Dm(u, _) if *u == user))
            .count()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Delete(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn sends_to(&self, channel: u64) -> Vec<MessageContent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Send(ch, content) if ch == channel => Some(content),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChatCall) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("chat platform unavailable");
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn next(&self) -> u64 {
        1000 + self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for RecordingChat {
    async fn send(&self, channel_id: u64, content: &MessageContent) -> Result<MessageRef> {
        self.record(ChatCall::Send(channel_id, content.clone()))?;
        Ok(MessageRef {
            channel_id,
            message_id: self.next(),
        })
    }

    async fn edit(&self, message: &MessageRef, _content: &MessageContent) -> Result<()> {
        self.record(ChatCall::Edit(*message))
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        self.record(ChatCall::Delete(*message))
    }

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()> {
        self.record(ChatCall::React(*message, emoji.to_string()))
    }

    async fn create_thread(&self, message: &MessageRef, _name: &str) -> Result<u64> {
        self.record(ChatCall::Thread(*message))?;
        Ok(self.next())
    }

    async fn dm(&self, user: UserId, content: &MessageContent) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(&user) {
            bail!("cannot send messages to this user");
        }
        self.record(ChatCall::Dm(user, content.clone()))
    }

    async fn fetch(&self, message: &MessageRef) -> Result<Option<ChatMessage>> {
        Ok(Some(ChatMessage {
            reference: *message,
            guild_id: Some(77),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueCall {
    Create {
        repo: String,
        title: String,
        labels: Vec<String>,
    },
    Comment(IssueRef, String),
    Close(IssueRef),
    Reopen(IssueRef),
    Relabel(IssueRef, Vec<String>),
    Rename(IssueRef, String),
    EditBody(IssueRef),
}

#[derive(Default)]
pub struct RecordingIssues {
    pub calls: Mutex<Vec<IssueCall>>,
    next_number: AtomicU64,
    pub down: AtomicBool,
}

impl RecordingIssues {
    pub fn calls(&self) -> Vec<IssueCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, IssueCall::Create { .. }))
            .count()
    }

    pub fn comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                IssueCall::Comment(_, body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: IssueCall) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("issue tracker unavailable");
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for RecordingIssues {
    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        _body: &str,
        labels: &[String],
    ) -> Result<IssueRef> {
        self.record(IssueCall::Create {
            repo: repo.to_string(),
            title: title.to_string(),
            labels: labels.to_vec(),
        })?;
        Ok(IssueRef::new(
            repo,
            100 + self.next_number.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        self.record(IssueCall::Comment(issue.clone(), body.to_string()))
    }

    async fn close(&self, issue: &IssueRef, _comment: Option<&str>) -> Result<()> {
        self.record(IssueCall::Close(issue.clone()))
    }

    async fn reopen(&self, issue: &IssueRef, _comment: Option<&str>) -> Result<()> {
        self.record(IssueCall::Reopen(issue.clone()))
    }

    async fn relabel(&self, issue: &IssueRef, labels: &[String]) -> Result<()> {
        self.record(IssueCall::Relabel(issue.clone(), labels.to_vec()))
    }

    async fn rename(&self, issue: &IssueRef, title: &str) -> Result<()> {
        self.record(IssueCall::Rename(issue.clone(), title.to_string()))
    }

    async fn edit_body(&self, issue: &IssueRef, _body: &str) -> Result<()> {
        self.record(IssueCall::EditBody(issue.clone()))
    }
}

pub struct Harness {
    pub tracker: Arc<Tracker>,
    pub store: Arc<InMemoryStore>,
    pub chat: Arc<RecordingChat>,
    pub issues: Arc<RecordingIssues>,
}

pub fn test_config() -> Config {
    let mut config = Config::minimal(PathBuf::from("unused.sqlite"));
    config.discord.tracker_channel = TRACKER_CHANNEL;
    config.discord.owners = vec![OWNER];
    config.github.owner_login = Some("release-owner".to_string());
    config.github.repos.insert("org/repo".to_string(), "AVR".to_string());
    config.bridge.label_delay_ms = 0;
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: Config) -> Harness {
    report_tracker::logging::init_test();
    let store = Arc::new(InMemoryStore::new());
    let chat = Arc::new(RecordingChat::default());
    let issues = Arc::new(RecordingIssues::default());
    let tracker = Arc::new(Tracker::new(
        Arc::new(config),
        store.clone(),
        chat.clone(),
        issues.clone(),
    ));
    Harness {
        tracker,
        store,
        chat,
        issues,
    }
}

pub fn new_report(prefix: &str, kind: ReportKind, title: &str) -> NewReport {
    NewReport {
        prefix: prefix.to_string(),
        kind,
        title: title.to_string(),
        reporter: Author::User(42),
        body: format!("{} body", title),
        repo: "org/repo".to_string(),
        issue: None,
        severity: Severity::UNCLASSIFIED,
    }
}

impl Harness {
    pub async fn bug(&self, title: &str) -> Report {
        self.tracker
            .create_report(new_report("AVR", ReportKind::Bug, title))
            .await
            .unwrap()
    }

    pub async fn feature(&self, title: &str) -> Report {
        self.tracker
            .create_report(new_report("AFR", ReportKind::FeatureRequest, title))
            .await
            .unwrap()
    }
}
