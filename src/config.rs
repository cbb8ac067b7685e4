//! TOML configuration parsing.
//!
//! Secrets never live in the config file: the Discord bot token and the
//! GitHub token are read from `DISCORD_TOKEN` and `GITHUB_TOKEN` by the
//! respective clients.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use report_tracker_core::ids::is_valid_prefix;
use report_tracker_core::{ReportKind, UserId};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub discord: DiscordConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub channels: Vec<ListenChannel>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Shared secret for `X-Hub-Signature-256` verification on `POST /github`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Bearer token required on the gateway relay endpoints.
    #[serde(default)]
    pub internal_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default = "default_discord_api")]
    pub api_url: String,
    /// Channel that holds one tracker message per open report.
    pub tracker_channel: u64,
    /// Users allowed to run owner-only commands and force actions.
    #[serde(default)]
    pub owners: Vec<UserId>,
    /// Reactions used to acknowledge a newly filed report.
    #[serde(default = "default_ack_reactions")]
    pub ack_reactions: Vec<String>,
    #[serde(default = "default_upvote")]
    pub upvote_emoji: String,
    #[serde(default = "default_downvote")]
    pub downvote_emoji: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_discord_api() -> String {
    "https://discord.com/api/v10".to_string()
}
fn default_ack_reactions() -> Vec<String> {
    ["\u{1f640}", "\u{1f426}", "\u{1f3f9}", "\u{1f989}", "\u{1f50d}", "\u{1f916}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_upvote() -> String {
    "\u{1f44d}".to_string()
}
fn default_downvote() -> String {
    "\u{1f44e}".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,
    /// Login of the account the bot writes as. Its own comments and issues
    /// are ignored by the webhook bridge.
    pub bot_login: String,
    /// Closing an issue as this login marks the report patch-pending
    /// instead of resolving it.
    #[serde(default)]
    pub owner_login: Option<String>,
    pub default_repo: String,
    /// Prefix used for issues opened directly on a repository.
    #[serde(default)]
    pub repos: HashMap<String, String>,
    #[serde(default = "default_bug_label")]
    pub bug_label: String,
    #[serde(default = "default_feature_label")]
    pub feature_label: String,
    #[serde(default = "default_exempt_label")]
    pub exempt_label: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_bug_label() -> String {
    "bug".to_string()
}
fn default_feature_label() -> String {
    "featurereq".to_string()
}
fn default_exempt_label() -> String {
    "exempt".to_string()
}

impl GitHubConfig {
    pub fn prefix_for_repo(&self, repo: &str) -> Option<&str> {
        self.repos.get(repo).map(|s| s.as_str())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VotingConfig {
    /// Score at which a feature request is mirrored to the issue tracker.
    #[serde(default = "default_mirror_threshold")]
    pub mirror_threshold: i64,
    /// Higher scores that add a `+N` label to the mirrored issue.
    #[serde(default = "default_relabel_thresholds")]
    pub relabel_thresholds: Vec<i64>,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            mirror_threshold: default_mirror_threshold(),
            relabel_thresholds: default_relabel_thresholds(),
        }
    }
}

fn default_mirror_threshold() -> i64 {
    5
}
fn default_relabel_thresholds() -> Vec<i64> {
    vec![10, 15]
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Delay before handling a `labeled` event, so the `opened` handler for
    /// the same new issue can commit first.
    #[serde(default = "default_label_delay_ms")]
    pub label_delay_ms: u64,
    #[serde(default = "default_delivery_log_capacity")]
    pub delivery_log_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            label_delay_ms: default_label_delay_ms(),
            delivery_log_capacity: default_delivery_log_capacity(),
        }
    }
}

fn default_label_delay_ms() -> u64 {
    2000
}
fn default_delivery_log_capacity() -> usize {
    256
}

/// A chat channel where new reports are filed.
#[derive(Debug, Deserialize, Clone)]
pub struct ListenChannel {
    pub id: u64,
    pub identifier: String,
    pub repo: String,
    /// Restrict the channel to one report kind. Both are accepted if unset.
    #[serde(default)]
    pub kind: Option<ReportKind>,
}

impl Config {
    pub fn listen_channel(&self, channel_id: u64) -> Option<&ListenChannel> {
        self.channels.iter().find(|c| c.id == channel_id)
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        self.discord.owners.contains(&user)
    }

    /// Whether `prefix` is configured on a listen channel or a repository.
    pub fn is_known_prefix(&self, prefix: &str) -> bool {
        self.channels.iter().any(|c| c.identifier == prefix)
            || self.github.repos.values().any(|p| p == prefix)
    }

    /// Report kind of the listen channel using `prefix`, if it restricts one.
    pub fn kind_for_prefix(&self, prefix: &str) -> Option<ReportKind> {
        self.channels
            .iter()
            .filter(|c| c.identifier == prefix)
            .find_map(|c| c.kind)
    }

    /// A config with only the required fields, for tests and dry runs.
    pub fn minimal(db_path: PathBuf) -> Self {
        Self {
            db: DbConfig { path: db_path },
            server: ServerConfig {
                bind: "127.0.0.1:8378".to_string(),
                webhook_secret: None,
                internal_token: None,
            },
            logging: LoggingConfig::default(),
            discord: DiscordConfig {
                api_url: default_discord_api(),
                tracker_channel: 1,
                owners: Vec::new(),
                ack_reactions: default_ack_reactions(),
                upvote_emoji: default_upvote(),
                downvote_emoji: default_downvote(),
                max_retries: default_max_retries(),
                timeout_secs: default_timeout_secs(),
            },
            github: GitHubConfig {
                api_url: default_github_api(),
                bot_login: "tracker-bot".to_string(),
                owner_login: None,
                default_repo: "org/repo".to_string(),
                repos: HashMap::new(),
                bug_label: default_bug_label(),
                feature_label: default_feature_label(),
                exempt_label: default_exempt_label(),
            },
            voting: VotingConfig::default(),
            bridge: BridgeConfig::default(),
            channels: Vec::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.discord.tracker_channel == 0 {
        anyhow::bail!("discord.tracker_channel must be set");
    }

    if config.voting.mirror_threshold < 1 {
        anyhow::bail!("voting.mirror_threshold must be >= 1");
    }

    let mut last = config.voting.mirror_threshold;
    for t in &config.voting.relabel_thresholds {
        if *t <= last {
            anyhow::bail!(
                "voting.relabel_thresholds must be ascending and above mirror_threshold ({} <= {})",
                t,
                last
            );
        }
        last = *t;
    }

    for chan in &config.channels {
        if !is_valid_prefix(&chan.identifier) {
            anyhow::bail!(
                "channel {}: identifier '{}' must be 2-8 uppercase ASCII letters",
                chan.id,
                chan.identifier
            );
        }
    }

    for (repo, prefix) in &config.github.repos {
        if !is_valid_prefix(prefix) {
            anyhow::bail!("github.repos.\"{}\": invalid prefix '{}'", repo, prefix);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[db]
path = "./data/tracker.sqlite"

[server]
bind = "127.0.0.1:8378"
webhook_secret = "hunter2"

[discord]
tracker_channel = 360855116057673729
owners = [187421759484592128]

[github]
bot_login = "tracker-bot"
owner_login = "maintainer"
default_repo = "avrae/avrae"

[github.repos]
"avrae/avrae" = "AVR"

[[channels]]
id = 336792750773239809
identifier = "AVR"
repo = "avrae/avrae"
kind = "bug"

[[channels]]
id = 297190603819843586
identifier = "AFR"
repo = "avrae/avrae"
kind = "feature_request"
"#;

    fn write(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_sample() {
        let (_dir, path) = write(SAMPLE);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.voting.mirror_threshold, 5);
        assert_eq!(cfg.voting.relabel_thresholds, vec![10, 15]);
        assert_eq!(cfg.bridge.label_delay_ms, 2000);
        assert_eq!(cfg.github.feature_label, "featurereq");
        assert_eq!(cfg.github.prefix_for_repo("avrae/avrae"), Some("AVR"));
        assert!(cfg.is_owner(187421759484592128));
        let chan = cfg.listen_channel(297190603819843586).unwrap();
        assert_eq!(chan.identifier, "AFR");
        assert_eq!(chan.kind, Some(ReportKind::FeatureRequest));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_prefix_lookups() {
        let (_dir, path) = write(SAMPLE);
        let cfg = load_config(&path).unwrap();
        assert!(cfg.is_known_prefix("AVR"));
        assert!(cfg.is_known_prefix("AFR"));
        assert!(!cfg.is_known_prefix("API"));
        assert_eq!(cfg.kind_for_prefix("AFR"), Some(ReportKind::FeatureRequest));
        assert_eq!(cfg.kind_for_prefix("AVR"), Some(ReportKind::Bug));
        assert_eq!(cfg.kind_for_prefix("TST"), None);
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let bad = format!("{}\n[voting]\nmirror_threshold = 5\nrelabel_thresholds = [4]\n", SAMPLE);
        let (_dir, path) = write(&bad);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("relabel_thresholds"));
    }

    #[test]
    fn test_rejects_bad_identifier() {
        let bad = SAMPLE.replace("identifier = \"AFR\"", "identifier = \"afr-x\"");
        let (_dir, path) = write(&bad);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/tracker.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
