//! User-facing chat commands.
//!
//! Every command implements [`Command`] and is looked up by name or alias
//! in a [`CommandRegistry`]. The built-in set covers reporting, voting,
//! subscriptions, search, and the owner-only lifecycle commands.
//!
//! Arguments arrive as the raw text after the command name. Most commands
//! take a report id as the first word and free text after it.

use async_trait::async_trait;
use report_tracker_core::{AttachmentKind, Report, ReportError};

use crate::chat::{Embed, EmbedField, MessageContent};
use crate::embed::{self, Paginator};
use crate::invocation::Invocation;
use crate::search::SearchOutcome;
use crate::service::{BatchOutcome, Tracker, TOP_MAX};

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn description(&self) -> &str;

    /// Owner-only commands are silently ignored for everyone else.
    fn owner_only(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: &str,
        inv: &dyn Invocation,
        tracker: &Tracker,
    ) -> Result<(), ReportError>;
}

/// Split `"AVR-001 some text"` into the first word and the trimmed rest.
fn split_first(args: &str) -> (&str, Option<String>) {
    let args = args.trim();
    match args.split_once(char::is_whitespace) {
        Some((first, rest)) => {
            let rest = rest.trim();
            (first, (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (args, None),
    }
}

fn missing(what: &str) -> ReportError {
    ReportError::NotFound(format!("(no {} given)", what))
}

/// Replies are best-effort: a failed send is logged, not propagated.
async fn reply(inv: &dyn Invocation, text: &str) {
    if let Err(e) = inv.reply(text).await {
        tracing::warn!(error = %e, "command reply failed");
    }
}

async fn reply_embed(inv: &dyn Invocation, embed: Embed) {
    if let Err(e) = inv.send(MessageContent::embed(embed)).await {
        tracing::warn!(error = %e, "command reply failed");
    }
}

/// Inside the report's own thread the edited tracker message is confirmation enough.
fn in_report_thread(inv: &dyn Invocation, report: &Report) -> bool {
    match (inv.channel_id(), report.message) {
        (Some(channel), Some(message)) => channel == message.message_id,
        _ => false,
    }
}

fn batch_message(verb: &str, total: usize, outcome: BatchOutcome) -> String {
    let mut out = format!("{} {} reports.", verb, outcome.updated);
    if outcome.not_found > 0 {
        out.push_str(&format!(" {} reports were not found.", outcome.not_found));
    }
    if outcome.skipped > 0 {
        out.push_str(&format!(" {} of {} were skipped.", outcome.skipped, total));
    }
    out
}

/// The commands shipped with the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    View,
    Vote(AttachmentKind),
    Subscribe,
    UnsubscribeAll,
    Search,
    Top,
    Resolve,
    Unresolve,
    Reidentify,
    Rename,
    Priority,
    Pending,
    Unpend,
    Release,
}

impl Builtin {
    pub const ALL: [Builtin; 18] = [
        Builtin::View,
        Builtin::Vote(AttachmentKind::CanReproduce),
        Builtin::Vote(AttachmentKind::CannotReproduce),
        Builtin::Vote(AttachmentKind::Upvote),
        Builtin::Vote(AttachmentKind::Downvote),
        Builtin::Vote(AttachmentKind::Note),
        Builtin::Subscribe,
        Builtin::UnsubscribeAll,
        Builtin::Search,
        Builtin::Top,
        Builtin::Resolve,
        Builtin::Unresolve,
        Builtin::Reidentify,
        Builtin::Rename,
        Builtin::Priority,
        Builtin::Pending,
        Builtin::Unpend,
        Builtin::Release,
    ];

    async fn vote(
        kind: AttachmentKind,
        args: &str,
        inv: &dyn Invocation,
        tracker: &Tracker,
    ) -> Result<(), ReportError> {
        let (id, message) = split_first(args);
        if id.is_empty() {
            return Err(missing("report id"));
        }
        if kind == AttachmentKind::Note && message.is_none() {
            return Err(ReportError::NotFound("(no note text given)".to_string()));
        }
        let (report, _) = tracker.cast(id, inv.actor(), kind, message, true).await?;
        if !in_report_thread(inv, &report) {
            reply(
                inv,
                &format!(
                    "Ok, I've added a note to `{}` - {}.",
                    report.report_id, report.title
                ),
            )
            .await;
        }
        Ok(())
    }

    async fn pending(args: &str, inv: &dyn Invocation, tracker: &Tracker) -> Result<(), ReportError> {
        let ids: Vec<String> = args.split_whitespace().map(str::to_string).collect();
        if ids.first().map(String::as_str) == Some("list") {
            let pending = tracker.pending_reports().await?;
            let list = pending
                .iter()
                .map(|r| format!("`{}`", r.report_id))
                .collect::<Vec<_>>()
                .join(", ");
            reply(inv, &format!("Pending reports: {}", list)).await;
            return Ok(());
        }
        let outcome = tracker.mark_pending(&ids).await?;
        reply(inv, &batch_message("Marked as patch pending:", ids.len(), outcome)).await;
        Ok(())
    }
}

#[async_trait]
impl Command for Builtin {
    fn name(&self) -> &str {
        match self {
            Builtin::View => "report",
            Builtin::Vote(AttachmentKind::CanReproduce) => "canrepro",
            Builtin::Vote(AttachmentKind::CannotReproduce) => "cannotrepro",
            Builtin::Vote(AttachmentKind::Upvote) => "upvote",
            Builtin::Vote(AttachmentKind::Downvote) => "downvote",
            Builtin::Vote(AttachmentKind::Note) => "note",
            Builtin::Subscribe => "subscribe",
            Builtin::UnsubscribeAll => "unsuball",
            Builtin::Search => "search",
            Builtin::Top => "top",
            Builtin::Resolve => "resolve",
            Builtin::Unresolve => "unresolve",
            Builtin::Reidentify => "reidentify",
            Builtin::Rename => "rename",
            Builtin::Priority => "priority",
            Builtin::Pending => "pending",
            Builtin::Unpend => "unpend",
            Builtin::Release => "release",
        }
    }

    fn aliases(&self) -> &[&str] {
        match self {
            Builtin::Vote(AttachmentKind::CanReproduce) => &["cr"],
            Builtin::Vote(AttachmentKind::CannotReproduce) => &["cnr"],
            Builtin::Vote(AttachmentKind::Upvote) => &["up"],
            Builtin::Vote(AttachmentKind::Downvote) => &["down"],
            Builtin::Subscribe => &["sub"],
            Builtin::Resolve => &["close"],
            Builtin::Unresolve => &["open"],
            Builtin::Reidentify => &["reassign"],
            Builtin::Priority => &["pri"],
            Builtin::Pending => &["pend"],
            Builtin::Release => &["update"],
            _ => &[],
        }
    }

    fn description(&self) -> &str {
        match self {
            Builtin::View => "Gets the detailed status of a report.",
            Builtin::Vote(AttachmentKind::CanReproduce) => "Adds reproduction to a report.",
            Builtin::Vote(AttachmentKind::CannotReproduce) => "Adds nonreproduction to a report.",
            Builtin::Vote(AttachmentKind::Upvote) => "Adds an upvote to a feature request.",
            Builtin::Vote(AttachmentKind::Downvote) => "Adds a downvote to a feature request.",
            Builtin::Vote(AttachmentKind::Note) => "Adds a note to a report.",
            Builtin::Subscribe => "Subscribes to or unsubscribes from a report.",
            Builtin::UnsubscribeAll => "Unsubscribes from all reports.",
            Builtin::Search => "Searches for a report by title.",
            Builtin::Top => "Lists the top open feature requests.",
            Builtin::Resolve => "Owner only - Resolves a report.",
            Builtin::Unresolve => "Owner only - Unresolves a report.",
            Builtin::Reidentify => "Owner only - Changes the identifier of a report.",
            Builtin::Rename => "Owner only - Changes the title of a report.",
            Builtin::Priority => "Owner only - Changes the priority of a report.",
            Builtin::Pending => "Owner only - Marks reports as pending for next patch.",
            Builtin::Unpend => "Owner only - Clears the pending flag.",
            Builtin::Release => "Owner only - Resolves all pending reports for a build.",
        }
    }

    fn owner_only(&self) -> bool {
        matches!(
            self,
            Builtin::Resolve
                | Builtin::Unresolve
                | Builtin::Reidentify
                | Builtin::Rename
                | Builtin::Priority
                | Builtin::Pending
                | Builtin::Unpend
                | Builtin::Release
        )
    }

    async fn execute(
        &self,
        args: &str,
        inv: &dyn Invocation,
        tracker: &Tracker,
    ) -> Result<(), ReportError> {
        match *self {
            Builtin::View => {
                let report = tracker.get_report(args).await?;
                reply_embed(inv, embed::report_embed(&report, true)).await;
            }
            Builtin::Vote(kind) => Self::vote(kind, args, inv, tracker).await?,
            Builtin::Subscribe => {
                let user = inv.actor().user_id().ok_or(ReportError::PermissionDenied)?;
                let (report, subscribed) = tracker.toggle_subscription(args, user).await?;
                let text = if subscribed {
                    format!("OK, subscribed to `{}` - {}.", report.report_id, report.title)
                } else {
                    format!("OK, unsubscribed from `{}` - {}.", report.report_id, report.title)
                };
                reply(inv, &text).await;
            }
            Builtin::UnsubscribeAll => {
                let user = inv.actor().user_id().ok_or(ReportError::PermissionDenied)?;
                let count = tracker.unsubscribe_all(user).await?;
                reply(inv, &format!("OK, unsubscribed from {} reports.", count)).await;
            }
            Builtin::Search => match tracker.search(args).await? {
                SearchOutcome::Match(report) => {
                    reply_embed(inv, embed::report_embed(&report, true)).await
                }
                SearchOutcome::Candidates(reports) => {
                    let lines: Vec<String> = reports.iter().map(embed::list_line).collect();
                    reply(
                        inv,
                        &format!("Multiple matches found:\n{}", lines.join("\n")),
                    )
                    .await;
                }
                SearchOutcome::NoMatch => reply(inv, "Report not found.").await,
            },
            Builtin::Top => {
                let n = match args.trim() {
                    "" => 10,
                    s => s.parse::<usize>().unwrap_or(0),
                };
                if n < 1 || n > TOP_MAX {
                    reply(inv, "Invalid number.").await;
                    return Ok(());
                }
                let mut pages = Paginator::new();
                for (report, url) in tracker.top(n).await? {
                    pages.add(&embed::top_line(&report, url.as_deref()));
                }
                let base = Embed {
                    title: Some(format!("Top {} Open Feature Requests", n)),
                    ..Embed::default()
                };
                let mut out = pages.into_embed(base);
                out.fields.insert(
                    0,
                    EmbedField {
                        name: "** **".to_string(),
                        value: "Click a report to jump to its tracker message.".to_string(),
                        inline: false,
                    },
                );
                reply_embed(inv, out).await;
            }
            Builtin::Resolve => {
                let (id, note) = split_first(args);
                let report = tracker.resolve(id, inv.actor(), note, true).await?;
                reply(
                    inv,
                    &format!("Resolved `{}`: {}.", report.report_id, report.title),
                )
                .await;
            }
            Builtin::Unresolve => {
                let (id, note) = split_first(args);
                let report = tracker.unresolve(id, inv.actor(), note, true).await?;
                reply(
                    inv,
                    &format!("Unresolved `{}`: {}.", report.report_id, report.title),
                )
                .await;
            }
            Builtin::Reidentify => {
                let (id, prefix) = split_first(args);
                let prefix = prefix.ok_or_else(|| missing("identifier"))?;
                let (old, new) = tracker.reidentify(id, &prefix, inv.actor()).await?;
                reply(
                    inv,
                    &format!("Reassigned {} as {}.", old.report_id, new.report_id),
                )
                .await;
            }
            Builtin::Rename => {
                let (id, title) = split_first(args);
                let title = title.ok_or_else(|| missing("title"))?;
                let report = tracker.rename(id, &title).await?;
                reply(
                    inv,
                    &format!("Renamed {} as {}.", report.report_id, report.title),
                )
                .await;
            }
            Builtin::Priority => {
                let (id, rest) = split_first(args);
                let rest = rest.ok_or_else(|| missing("priority"))?;
                let (rank, note) = split_first(&rest);
                let rank: i64 = rank
                    .trim_start_matches(['P', 'p'])
                    .parse()
                    .map_err(|_| ReportError::InvalidSeverity(-1))?;
                let report = tracker.set_priority(id, inv.actor(), rank, note).await?;
                reply(
                    inv,
                    &format!(
                        "Changed priority of `{}`: {} to P{}.",
                        report.report_id, report.title, rank
                    ),
                )
                .await;
            }
            Builtin::Pending => Self::pending(args, inv, tracker).await?,
            Builtin::Unpend => {
                let ids: Vec<String> = args.split_whitespace().map(str::to_string).collect();
                let outcome = tracker.unmark_pending(&ids).await?;
                reply(inv, &batch_message("Unpended", ids.len(), outcome)).await;
            }
            Builtin::Release => {
                let (build, message) = split_first(args);
                if build.is_empty() {
                    return Err(missing("build id"));
                }
                let summary = tracker.release(build, message, inv.actor()).await?;
                let mut pages = Paginator::new();
                for page in &summary.changelog {
                    pages.add(page);
                }
                let base = Embed {
                    title: Some(format!("**Build {}**", summary.build)),
                    color: Some(embed::RELEASE_COLOR),
                    ..Embed::default()
                };
                reply_embed(inv, pages.into_embed(base)).await;
            }
        }
        Ok(())
    }
}

/// Registry of chat commands, looked up by name or alias.
pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// A registry pre-loaded with every [`Builtin`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in Builtin::ALL {
            registry.register(Box::new(builtin));
        }
        registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&dyn Command> {
        let name = name.to_lowercase();
        self.commands
            .iter()
            .find(|c| c.name() == name || c.aliases().contains(&name.as_str()))
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Run a command. Returns `false` if no command has that name.
    ///
    /// User-facing errors are sent back to the invoker; internal ones are
    /// logged and replaced with a generic message.
    pub async fn dispatch(
        &self,
        name: &str,
        args: &str,
        inv: &dyn Invocation,
        tracker: &Tracker,
    ) -> bool {
        let Some(command) = self.find(name) else {
            return false;
        };
        if command.owner_only() {
            let is_owner = inv
                .actor()
                .user_id()
                .map(|u| tracker.config().is_owner(u))
                .unwrap_or(false);
            if !is_owner {
                tracing::debug!(command = command.name(), "owner-only command ignored");
                return true;
            }
        }

        if let Err(e) = command.execute(args, inv, tracker).await {
            if e.is_user_facing() {
                reply(inv, &e.to_string()).await;
            } else {
                tracing::error!(command = command.name(), error = %e, "command failed");
                reply(inv, "Something went wrong. Please try again later.").await;
            }
        }
        true
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
