//! # Report Tracker CLI (`tracker`)
//!
//! The `tracker` binary runs the bot's HTTP server and offers a handful of
//! maintenance commands that work directly on the report database.
//!
//! ## Usage
//!
//! ```bash
//! tracker --config ./config/tracker.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tracker init` | Create the SQLite database and run schema migrations |
//! | `tracker serve` | Start the webhook and gateway relay server |
//! | `tracker show <id>` | Print a report |
//! | `tracker pending` | List reports marked as patch pending |
//! | `tracker resolve <id>` | Resolve a report |
//! | `tracker unresolve <id>` | Reopen a resolved report |
//! | `tracker release <build>` | Resolve every pending report for a build |
//! | `tracker unsubscribe-all <user>` | Remove a user from every subscriber list |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use report_tracker::chat::DiscordClient;
use report_tracker::config::{self, Config};
use report_tracker::github::GitHubClient;
use report_tracker::service::Tracker;
use report_tracker::sqlite_store::SqliteStore;
use report_tracker::{db, embed, logging, migrate, server};
use report_tracker_core::store::{ReportFilter, ReportStore};
use report_tracker_core::{Author, Report, UserId};

/// Report Tracker: chat-driven bug reports and feature requests, mirrored
/// to an issue tracker.
#[derive(Parser)]
#[command(name = "tracker", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tracker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Print a report with its full history.
    Show { id: String },

    /// List reports marked as patch pending.
    Pending,

    /// Resolve a report and close its linked issue.
    Resolve {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },

    /// Reopen a resolved report and its linked issue.
    Unresolve {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },

    /// Resolve every pending report as shipped in `build`.
    Release {
        build: String,
        /// Extra changelog text appended after the generated entries.
        #[arg(long)]
        message: Option<String>,
    },

    /// Remove a user from every report's subscriber list.
    UnsubscribeAll { user: UserId },
}

fn console() -> Author {
    Author::External("console".to_string())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteStore>> {
    let pool = db::connect(config).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

/// Full service stack for commands that touch the chat platform or issue tracker.
async fn open_tracker(config: &Config) -> anyhow::Result<Tracker> {
    let config = Arc::new(config.clone());
    Ok(Tracker::new(
        config.clone(),
        open_store(&config).await?,
        Arc::new(DiscordClient::from_config(&config.discord)?),
        Arc::new(GitHubClient::new(&config.github)),
    ))
}

fn print_report(report: &Report) {
    println!("{} {}", report.report_id, report.title);
    println!("  kind:     {}", report.kind.as_str());
    println!("  status:   {}", report.status.display());
    println!("  reporter: {}", embed::author_label(&report.reporter));
    println!("  tally:    {}", embed::tally_summary(report));
    if let Some(issue) = &report.issue {
        println!("  issue:    {}", issue.html_url());
    }
    for attachment in &report.attachments {
        println!(
            "  - {} by {}: {}",
            attachment.kind.title(),
            embed::author_label(&attachment.author),
            attachment.message.as_deref().unwrap_or("")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Show { id } => {
            let store = open_store(&cfg).await?;
            let id = report_tracker_core::ids::normalize_report_id(&id);
            match store.get(&id).await? {
                Some(report) => print_report(&report),
                None => anyhow::bail!("Report not found: {}", id),
            }
        }
        Commands::Pending => {
            let store = open_store(&cfg).await?;
            let pending = store.scan(&ReportFilter::pending()).await?;
            if pending.is_empty() {
                println!("No pending reports.");
            }
            for report in pending {
                println!("{}", embed::list_line(&report));
            }
        }
        Commands::Resolve { id, note } => {
            let tracker = open_tracker(&cfg).await?;
            let report = tracker.resolve(&id, console(), note, true).await?;
            println!("Resolved `{}`: {}.", report.report_id, report.title);
        }
        Commands::Unresolve { id, note } => {
            let tracker = open_tracker(&cfg).await?;
            let report = tracker.unresolve(&id, console(), note, true).await?;
            println!("Unresolved `{}`: {}.", report.report_id, report.title);
        }
        Commands::Release { build, message } => {
            let tracker = open_tracker(&cfg).await?;
            let summary = tracker.release(&build, message, console()).await?;
            println!("Build {}: {} reports resolved", summary.build, summary.resolved.len());
            for page in &summary.changelog {
                println!("{}", page);
            }
        }
        Commands::UnsubscribeAll { user } => {
            let tracker = open_tracker(&cfg).await?;
            let count = tracker.unsubscribe_all(user).await?;
            println!("Unsubscribed {} from {} reports.", user, count);
        }
    }

    Ok(())
}
