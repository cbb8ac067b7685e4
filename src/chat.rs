//! Chat platform abstraction and the Discord REST client.
//!
//! The [`ChatPlatform`] trait is the only way the rest of the crate talks to
//! Discord. [`DiscordClient`] implements it over the REST API; tests use
//! recording fakes.
//!
//! # Retry strategy
//!
//! - HTTP 429 or 5xx → retry with exponential backoff (honouring
//!   `retry_after` on 429 when present)
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use report_tracker_core::{MessageRef, UserId};

use crate::config::DiscordConfig;

/// A rich embed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl Embed {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// Body of a message to send or edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl MessageContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}

/// A message fetched back from the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub reference: MessageRef,
    pub guild_id: Option<u64>,
}

impl ChatMessage {
    /// Link that jumps to the message in the client.
    pub fn jump_url(&self) -> String {
        let guild = self
            .guild_id
            .map(|g| g.to_string())
            .unwrap_or_else(|| "@me".to_string());
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild, self.reference.channel_id, self.reference.message_id
        )
    }
}

/// Operations the tracker needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send(&self, channel_id: u64, content: &MessageContent) -> Result<MessageRef>;

    async fn edit(&self, message: &MessageRef, content: &MessageContent) -> Result<()>;

    async fn delete(&self, message: &MessageRef) -> Result<()>;

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()>;

    /// Start a thread on a message. Returns the thread's channel id.
    async fn create_thread(&self, message: &MessageRef, name: &str) -> Result<u64>;

    /// Direct-message a user.
    async fn dm(&self, user: UserId, content: &MessageContent) -> Result<()>;

    /// Fetch a message; `Ok(None)` if it no longer exists.
    async fn fetch(&self, message: &MessageRef) -> Result<Option<ChatMessage>>;
}

/// Discord REST v10 client authenticated with a bot token.
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
}

#[derive(Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct RateLimited {
    retry_after: f64,
}

fn parse_snowflake(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("invalid snowflake from Discord: {}", s))
}

impl DiscordClient {
    /// Create a client from config, reading `DISCORD_TOKEN` from the environment.
    pub fn from_config(config: &DiscordConfig) -> Result<Self> {
        let token = std::env::var("DISCORD_TOKEN")
            .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN environment variable not set"))?;
        Self::new(config, token)
    }

    pub fn new(config: &DiscordConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("DiscordBot (report-tracker, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            max_retries: config.max_retries,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = resp
                        .json::<RateLimited>()
                        .await
                        .map(|r| Duration::from_secs_f64(r.retry_after))
                        .unwrap_or_else(|_| Duration::from_secs(1 << attempt.min(5)));
                    last_err = Some(anyhow::anyhow!("Discord rate limited {} {}", method, path));
                    if attempt < self.max_retries {
                        tokio::time::sleep(wait).await;
                    }
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = Some(anyhow::anyhow!(
                        "Discord {} {} returned {}",
                        method,
                        path,
                        resp.status()
                    ));
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt.min(5))).await;
                    }
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    bail!("Discord {} {} returned {}: {}", method, path, status, text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt.min(5))).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Discord request failed after retries")))
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn send(&self, channel_id: u64, content: &MessageContent) -> Result<MessageRef> {
        let body = serde_json::to_value(content)?;
        let resp = self
            .request(
                Method::POST,
                &format!("/channels/{}/messages", channel_id),
                Some(&body),
            )
            .await?;
        let msg: DiscordMessage = resp.json().await?;
        Ok(MessageRef {
            channel_id: parse_snowflake(&msg.channel_id)?,
            message_id: parse_snowflake(&msg.id)?,
        })
    }

    async fn edit(&self, message: &MessageRef, content: &MessageContent) -> Result<()> {
        let body = serde_json::to_value(content)?;
        self.request(
            Method::PATCH,
            &format!(
                "/channels/{}/messages/{}",
                message.channel_id, message.message_id
            ),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        self.request(
            Method::DELETE,
            &format!(
                "/channels/{}/messages/{}",
                message.channel_id, message.message_id
            ),
            None,
        )
        .await?;
        Ok(())
    }

    async fn add_reaction(&self, message: &MessageRef, emoji: &str) -> Result<()> {
        let encoded: String = url_encode(emoji);
        self.request(
            Method::PUT,
            &format!(
                "/channels/{}/messages/{}/reactions/{}/@me",
                message.channel_id, message.message_id, encoded
            ),
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_thread(&self, message: &MessageRef, name: &str) -> Result<u64> {
        let name: String = name.chars().take(100).collect();
        let body = serde_json::json!({ "name": name });
        let resp = self
            .request(
                Method::POST,
                &format!(
                    "/channels/{}/messages/{}/threads",
                    message.channel_id, message.message_id
                ),
                Some(&body),
            )
            .await?;
        let channel: DiscordChannel = resp.json().await?;
        parse_snowflake(&channel.id)
    }

    async fn dm(&self, user: UserId, content: &MessageContent) -> Result<()> {
        let body = serde_json::json!({ "recipient_id": user.to_string() });
        let resp = self
            .request(Method::POST, "/users/@me/channels", Some(&body))
            .await?;
        let channel: DiscordChannel = resp.json().await?;
        self.send(parse_snowflake(&channel.id)?, content).await?;
        Ok(())
    }

    async fn fetch(&self, message: &MessageRef) -> Result<Option<ChatMessage>> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, message.channel_id, message.message_id
        );
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("Discord fetch returned {}", resp.status());
        }
        let msg: DiscordMessage = resp.json().await?;
        let guild_id = match msg.guild_id {
            Some(g) => Some(parse_snowflake(&g)?),
            None => self.channel_guild(message.channel_id).await.ok().flatten(),
        };
        Ok(Some(ChatMessage {
            reference: *message,
            guild_id,
        }))
    }
}

impl DiscordClient {
    async fn channel_guild(&self, channel_id: u64) -> Result<Option<u64>> {
        let resp = self
            .request(Method::GET, &format!("/channels/{}", channel_id), None)
            .await?;
        let channel: DiscordChannel = resp.json().await?;
        channel.guild_id.as_deref().map(parse_snowflake).transpose()
    }
}

/// Percent-encode an emoji for use in a reaction URL path.
///
/// Custom emoji (`name:id`) pass through unchanged apart from the colon.
fn url_encode(s: &str) -> String {
    let mut out = String::new();
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
