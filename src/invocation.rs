//! Who triggered an operation and how to answer them.
//!
//! Each invocation source (a chat command, a reaction, a webhook delivery)
//! implements [`Invocation`] once, so handlers never need to know where a
//! request came from.

use anyhow::Result;
use async_trait::async_trait;
use report_tracker_core::{Author, UserId};

use crate::chat::{ChatPlatform, MessageContent};

#[async_trait]
pub trait Invocation: Send + Sync {
    /// The acting user or external source.
    fn actor(&self) -> Author;

    /// Channel the request came from, if any.
    fn channel_id(&self) -> Option<u64> {
        None
    }

    /// Reply to the actor.
    async fn send(&self, content: MessageContent) -> Result<()>;

    /// Chat platform handle, if this source has one.
    fn platform(&self) -> Option<&dyn ChatPlatform>;

    async fn reply(&self, text: &str) -> Result<()> {
        self.send(MessageContent::text(text)).await
    }
}

/// A command typed in a chat channel; replies go to the same channel.
pub struct CommandInvocation<'a> {
    pub chat: &'a dyn ChatPlatform,
    pub user: UserId,
    pub channel_id: u64,
}

#[async_trait]
impl Invocation for CommandInvocation<'_> {
    fn actor(&self) -> Author {
        Author::User(self.user)
    }

    fn channel_id(&self) -> Option<u64> {
        Some(self.channel_id)
    }

    async fn send(&self, content: MessageContent) -> Result<()> {
        self.chat.send(self.channel_id, &content).await?;
        Ok(())
    }

    fn platform(&self) -> Option<&dyn ChatPlatform> {
        Some(self.chat)
    }
}

/// A reaction on a tracker message; replies go by direct message.
pub struct ReactionInvocation<'a> {
    pub chat: &'a dyn ChatPlatform,
    pub user: UserId,
}

#[async_trait]
impl Invocation for ReactionInvocation<'_> {
    fn actor(&self) -> Author {
        Author::User(self.user)
    }

    async fn send(&self, content: MessageContent) -> Result<()> {
        self.chat.dm(self.user, &content).await
    }

    fn platform(&self) -> Option<&dyn ChatPlatform> {
        Some(self.chat)
    }
}

/// An issue-tracker webhook delivery. There is nobody to answer, so
/// replies are logged.
pub struct WebhookInvocation {
    pub login: String,
}

impl WebhookInvocation {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

#[async_trait]
impl Invocation for WebhookInvocation {
    fn actor(&self) -> Author {
        Author::External(format!("GitHub - {}", self.login))
    }

    async fn send(&self, content: MessageContent) -> Result<()> {
        tracing::info!(login = %self.login, content = ?content.content, "webhook reply");
        Ok(())
    }

    fn platform(&self) -> Option<&dyn ChatPlatform> {
        None
    }
}
