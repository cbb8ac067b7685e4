//! Commands, message intake, and reactions through the recording chat fake.

mod common;

use common::{harness, harness_with, test_config, ChatCall, OWNER, TRACKER_CHANNEL};
use report_tracker::commands::CommandRegistry;
use report_tracker::config::ListenChannel;
use report_tracker::intake::{handle_message, IncomingMessage, IntakeOutcome, UploadedFile};
use report_tracker::invocation::CommandInvocation;
use report_tracker::reactions::{handle_reaction, ReactionEvent, ReactionOutcome};
use report_tracker_core::store::ReportStore;
use report_tracker_core::{AttachmentKind, ReportKind, Status};

const CHANNEL: u64 = 55;

fn texts(calls: &[ChatCall], channel: u64) -> Vec<String> {
    calls
        .iter()
        .filter_map(|c| match c {
            ChatCall::Send(ch, content) if *ch == channel => content.content.clone(),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_vote_command_confirms() {
    let h = harness();
    h.bug("Crash").await;
    let registry = CommandRegistry::with_builtins();
    let inv = CommandInvocation {
        chat: h.chat.as_ref(),
        user: 5,
        channel_id: CHANNEL,
    };

    assert!(registry.dispatch("cr", "AVR-001 same here", &inv, &h.tracker).await);
    let report = h.store.get("AVR-001").await.unwrap().unwrap();
    assert_eq!(report.verification, 1);
    assert_eq!(
        texts(&h.chat.calls(), CHANNEL),
        vec!["Ok, I've added a note to `AVR-001` - Crash.".to_string()]
    );

    registry.dispatch("cr", "AVR-001", &inv, &h.tracker).await;
    let replies = texts(&h.chat.calls(), CHANNEL);
    assert_eq!(
        replies.last().unwrap(),
        "You have already verified/upvoted/downvoted `AVR-001`."
    );
}

#[tokio::test]
async fn test_vote_inside_thread_is_silent() {
    let h = harness();
    let report = h.bug("Crash").await;
    let thread = report.message.unwrap().message_id;
    let registry = CommandRegistry::with_builtins();
    let inv = CommandInvocation {
        chat: h.chat.as_ref(),
        user: 5,
        channel_id: thread,
    };
    registry.dispatch("note", "AVR-001 also on linux", &inv, &h.tracker).await;
    assert!(texts(&h.chat.calls(), thread).is_empty());
}

#[tokio::test]
async fn test_unknown_and_owner_only_commands() {
    let h = harness();
    h.bug("Crash").await;
    let registry = CommandRegistry::with_builtins();
    let user = CommandInvocation {
        chat: h.chat.as_ref(),
        user: 5,
        channel_id: CHANNEL,
    };

    assert!(!registry.dispatch("frobnicate", "", &user, &h.tracker).await);

    assert!(registry.dispatch("resolve", "AVR-001", &user, &h.tracker).await);
    assert!(h.store.get("AVR-001").await.unwrap().unwrap().status.is_open());
    assert!(texts(&h.chat.calls(), CHANNEL).is_empty());

    let owner = CommandInvocation {
        chat: h.chat.as_ref(),
        user: OWNER,
        channel_id: CHANNEL,
    };
    registry.dispatch("close", "AVR-001 fixed", &owner, &h.tracker).await;
    assert_eq!(
        h.store.get("AVR-001").await.unwrap().unwrap().status,
        Status::Resolved
    );
    assert_eq!(
        texts(&h.chat.calls(), CHANNEL),
        vec!["Resolved `AVR-001`: Crash.".to_string()]
    );
}

#[tokio::test]
async fn test_subscribe_toggle_and_pending_list() {
    let h = harness();
    h.bug("Crash").await;
    h.bug("Freeze").await;
    let registry = CommandRegistry::with_builtins();
    let owner = CommandInvocation {
        chat: h.chat.as_ref(),
        user: OWNER,
        channel_id: CHANNEL,
    };

    registry.dispatch("sub", "AVR-001", &owner, &h.tracker).await;
    registry.dispatch("sub", "AVR-001", &owner, &h.tracker).await;
    registry.dispatch("pend", "AVR-001 AVR-002", &owner, &h.tracker).await;
    registry.dispatch("pending", "list", &owner, &h.tracker).await;
    registry.dispatch("top", "50", &owner, &h.tracker).await;

    let replies = texts(&h.chat.calls(), CHANNEL);
    assert_eq!(
        replies,
        vec![
            "OK, subscribed to `AVR-001` - Crash.".to_string(),
            "OK, unsubscribed from `AVR-001` - Crash.".to_string(),
            "Marked as patch pending: 2 reports.".to_string(),
            "Pending reports: `AVR-001`, `AVR-002`".to_string(),
            "Invalid number.".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_release_command_posts_changelog() {
    let h = harness();
    h.bug("Crash").await;
    h.tracker.mark_pending(&["AVR-001".into()]).await.unwrap();
    let registry = CommandRegistry::with_builtins();
    let owner = CommandInvocation {
        chat: h.chat.as_ref(),
        user: OWNER,
        channel_id: CHANNEL,
    };
    registry.dispatch("update", "2.0.1", &owner, &h.tracker).await;

    let sent = h.chat.sends_to(CHANNEL);
    let embed = &sent.last().unwrap().embeds[0];
    assert_eq!(embed.title.as_deref(), Some("**Build 2.0.1**"));
    assert!(embed.description.as_deref().unwrap().contains("`AVR-001` Crash"));
}

fn listen_harness() -> common::Harness {
    let mut config = test_config();
    config.channels.push(ListenChannel {
        id: CHANNEL,
        identifier: "AVR".to_string(),
        repo: "org/repo".to_string(),
        kind: None,
    });
    harness_with(config)
}

fn message(content: &str) -> IncomingMessage {
    IncomingMessage {
        channel_id: CHANNEL,
        message_id: 600,
        author: 42,
        author_is_bot: false,
        content: content.to_string(),
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn test_intake_creates_report_and_acknowledges() {
    let h = listen_harness();
    let mut msg = message("**What is the bug?**: Spell slots reset\nHappens on reload");
    msg.attachments.push(UploadedFile {
        filename: "shot.png".into(),
        url: "https://cdn/shot.png".into(),
    });

    let outcome = handle_message(&h.tracker, &msg).await.unwrap();
    let IntakeOutcome::Created(report) = outcome else {
        panic!("expected a new report");
    };
    assert_eq!(report.report_id, "AVR-001");
    assert_eq!(report.kind, ReportKind::Bug);
    assert_eq!(report.title, "Spell slots reset");
    assert!(report.body().ends_with("![shot.png](https://cdn/shot.png)"));
    assert!(report.subscribers.contains(&42));

    let acked = h.chat.calls().iter().any(|c| {
        matches!(c, ChatCall::React(m, _) if m.channel_id == CHANNEL && m.message_id == 600)
    });
    assert!(acked);
    assert_eq!(h.chat.sends_to(TRACKER_CHANNEL).len(), 1);
}

#[tokio::test]
async fn test_intake_ignores_bots_and_answers_references() {
    let h = listen_harness();
    let mut bot = message("**Feature Request**: Dark mode");
    bot.author_is_bot = true;
    assert_eq!(
        handle_message(&h.tracker, &bot).await.unwrap(),
        IntakeOutcome::Ignored
    );

    h.bug("Crash").await;
    let outcome = handle_message(&h.tracker, &message("is this #avr-1 again?"))
        .await
        .unwrap();
    assert_eq!(outcome, IntakeOutcome::Referenced(1));
}

#[tokio::test]
async fn test_reactions() {
    let h = harness();
    let report = h.feature("Dark mode").await;
    let message_id = report.message.unwrap().message_id;
    let up = h.tracker.config().discord.upvote_emoji.clone();
    let event = |user, emoji: &str| ReactionEvent {
        message_id,
        channel_id: TRACKER_CHANNEL,
        user_id: user,
        emoji: emoji.to_string(),
        user_is_bot: false,
    };

    assert_eq!(
        handle_reaction(&h.tracker, &event(5, &up)).await.unwrap(),
        ReactionOutcome::Voted(AttachmentKind::Upvote)
    );
    assert!(matches!(
        handle_reaction(&h.tracker, &event(5, &up)).await.unwrap(),
        ReactionOutcome::Rejected(_)
    ));
    assert_eq!(h.chat.dms_to(5), 1);
    assert_eq!(
        handle_reaction(&h.tracker, &event(5, "\u{1f389}")).await.unwrap(),
        ReactionOutcome::Ignored
    );

    assert_eq!(
        handle_reaction(&h.tracker, &event(OWNER, &up)).await.unwrap(),
        ReactionOutcome::Accepted
    );
    let stored = h.store.get("AFR-001").await.unwrap().unwrap();
    assert!(stored.issue.is_some());
    assert_eq!(stored.score(), 1);
}
