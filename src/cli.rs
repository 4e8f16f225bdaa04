//! CLI interface for doctrack.
//!
//! Each subcommand is non-interactive: arguments in, JSON on stdout, a short
//! human summary on stderr. Writes are attributed to the person resolved by
//! [`crate::identity`]; sweeps act as the system.
//!
//! - `doctrack doc new|show|history|revise|comment|holders|verify`
//! - `doctrack transition <doc> <axis> <state>`
//! - `doctrack states <axis>`
//! - `doctrack last-call issue <doc>`
//! - `doctrack ballot open|position|close|show`
//! - `doctrack sweep expire|last-call`

mod ballot;
mod doc;
mod format;
mod sweep;

use clap::{Parser, Subcommand};
use jiff::SignedDuration;
use tracing::error;

use doctrack::model::{Actor, Axis};
use doctrack::{Tracker, TrackerError, TransitionRequest};

use crate::config::Config;
use crate::identity::resolve_identity;

use ballot::BallotCommand;
use doc::DocCommand;
use format::print_json;
use sweep::SweepCommand;

/// Doctrack: IETF document lifecycle and ballots.
#[derive(Debug, Parser)]
#[command(name = "doctrack", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Acting person, `Name <email>` or an address. Overrides
    /// `DOCTRACK_ACTOR` and the configured actor.
    #[arg(long = "as", global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: taking a draft through IESG approval
  1. doctrack --as "Ada <ada@ietf.org>" doc new draft-ietf-quic-foo --group quic \
       --ad ada@ietf.org --author "Alice <alice@example.org>" --state draft-iesg=pub-req
  2. doctrack transition draft-ietf-quic-foo draft-iesg ad-eval
  3. doctrack transition draft-ietf-quic-foo draft-iesg lc-req --comment "Ready"
  4. doctrack last-call issue draft-ietf-quic-foo --days 14
  5. doctrack sweep last-call
  6. doctrack ballot open draft-ietf-quic-foo iesg-approve
  7. doctrack --as "Bo <bo@ietf.org>" ballot position <ballot-id> yes
  8. doctrack ballot close <ballot-id>"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create, inspect, and annotate documents.
    Doc {
        #[command(subcommand)]
        command: DocCommand,
    },

    /// Move a document to a new state on one axis.
    ///
    /// The comment, if any, is recorded before the state change.
    Transition {
        document: String,

        /// State axis, e.g. `draft-iesg` or `draft-stream-ietf`.
        axis: Axis,

        /// Target state slug. Use the current state for a tag-only change.
        state: String,

        #[arg(long)]
        comment: Option<String>,

        /// Tag to set. Repeatable.
        #[arg(long = "add-tag")]
        add_tags: Vec<String>,

        /// Tag to clear. Repeatable.
        #[arg(long = "remove-tag")]
        remove_tags: Vec<String>,
    },

    /// List states on an axis, or the states reachable from one.
    States {
        axis: Axis,

        /// Show only states reachable from this one.
        #[arg(long)]
        from: Option<String>,

        /// Apply this group's overlay.
        #[arg(long)]
        group: Option<String>,
    },

    /// IETF last call.
    LastCall {
        #[command(subcommand)]
        command: LastCallCommand,
    },

    /// Open, vote on, and close ballots.
    Ballot {
        #[command(subcommand)]
        command: BallotCommand,
    },

    /// Scheduled sweeps. Always act as the system.
    Sweep {
        #[command(subcommand)]
        command: SweepCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum LastCallCommand {
    /// Move the document into last call and record when it ends.
    Issue {
        document: String,

        /// Length of the last call in days.
        #[arg(long, default_value_t = 14)]
        days: i64,
    },
}

/// What every command handler gets.
pub(crate) struct Context<'a> {
    config: &'a Config,
    tracker: &'a Tracker,
    actor: Option<String>,
}

impl Context<'_> {
    /// The acting person, resolved through the identity chain.
    fn actor(&self) -> Result<Actor, String> {
        resolve_identity(self.actor.as_deref(), self.config.actor.as_deref()).map(Actor::from)
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config, tracker: &Tracker) -> Result<(), String> {
    let cli = Cli::parse();
    let ctx = Context {
        config,
        tracker,
        actor: cli.actor,
    };

    match cli.command {
        Command::Doc { command } => doc::run(&ctx, command),
        Command::Transition {
            document,
            axis,
            state,
            comment,
            add_tags,
            remove_tags,
        } => {
            let mut request = TransitionRequest::new(document, axis, state, ctx.actor()?);
            request.comment = comment;
            request.tags_add.extend(add_tags);
            request.tags_remove.extend(remove_tags);
            cmd_transition(&ctx, &request)
        }
        Command::States { axis, from, group } => cmd_states(&ctx, axis, from.as_deref(), group.as_deref()),
        Command::LastCall {
            command: LastCallCommand::Issue { document, days },
        } => cmd_issue_last_call(&ctx, &document, days),
        Command::Ballot { command } => ballot::run(&ctx, command),
        Command::Sweep { command } => sweep::run(&ctx, command),
    }
}

fn cmd_transition(ctx: &Context<'_>, request: &TransitionRequest) -> Result<(), String> {
    let result = ctx.tracker.transition(request).map_err(failure)?;
    eprintln!(
        "{}: {} is {} ({} event(s))",
        request.document,
        request.axis,
        result.document.state(request.axis).unwrap_or("(none)"),
        result.events.len()
    );
    print_json(&result)
}

fn cmd_states(
    ctx: &Context<'_>,
    axis: Axis,
    from: Option<&str>,
    group: Option<&str>,
) -> Result<(), String> {
    let registry = ctx.tracker.registry();
    match from {
        Some(current) => {
            if registry.state(axis, current).is_none() {
                return Err(failure(TrackerError::UnknownState {
                    axis,
                    state: current.to_string(),
                }));
            }
            print_json(&registry.allowed_next_states(axis, Some(current), group))
        }
        None => print_json(&registry.allowed_next_states(axis, None, group)),
    }
}

fn cmd_issue_last_call(ctx: &Context<'_>, document: &str, days: i64) -> Result<(), String> {
    if days <= 0 {
        return Err("--days must be positive".to_string());
    }
    let expires = jiff::Timestamp::now() + SignedDuration::from_hours(days * 24);
    let result = ctx
        .tracker
        .issue_last_call(document, expires, &ctx.actor()?)
        .map_err(failure)?;
    eprintln!("{document}: last call ends {}", expires.strftime("%Y-%m-%d"));
    print_json(&result)
}

/// Turns a tracker error into the message shown to the user.
///
/// Internal errors are logged in full and reported generically.
fn failure(e: TrackerError) -> String {
    if !e.is_user_error() {
        error!(error = %e, "operation failed");
    }
    e.public_message()
}
