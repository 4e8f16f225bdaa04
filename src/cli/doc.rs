//! Document commands: new, show, history, revise, comment, holders, verify.

use std::collections::BTreeMap;

use clap::Subcommand;

use doctrack::model::{Axis, EventType, Person, Stream};
use doctrack::tracker::NewDocument;

use super::format::{format_holders, format_states, print_json};
use super::{Context, failure};

#[derive(Debug, Subcommand)]
pub enum DocCommand {
    /// Register a document and its first revision.
    New {
        name: String,

        #[arg(long, default_value = "00")]
        rev: String,

        #[arg(long, default_value = "ietf")]
        stream: Stream,

        /// Responsible group acronym, e.g. `quic`.
        #[arg(long)]
        group: Option<String>,

        /// Responsible Area Director.
        #[arg(long)]
        ad: Option<Person>,

        /// Author, `Name <email>` or an address. Repeatable.
        #[arg(long = "author")]
        authors: Vec<Person>,

        /// Initial state as `axis=state`. Repeatable. The draft axis
        /// starts `active` unless given.
        #[arg(long = "state", value_parser = parse_state)]
        states: Vec<(Axis, String)>,
    },

    /// Print a document's current snapshot.
    Show { name: String },

    /// Print a document's events, oldest first.
    History {
        name: String,

        /// Only events of this type, e.g. `changed_state`.
        #[arg(long = "type")]
        event_type: Option<EventType>,
    },

    /// Record a new revision. Revives an expired draft.
    Revise { name: String, rev: String },

    /// Add a free-text comment to the history.
    Comment { name: String, text: String },

    /// Replace the action holders.
    Holders {
        name: String,

        /// `Name <email>` or an address. None clears the set.
        people: Vec<Person>,
    },

    /// Check that the stored snapshot matches a replay of the history.
    Verify { name: String },
}

fn parse_state(s: &str) -> Result<(Axis, String), String> {
    let (axis, state) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `axis=state`, got {s:?}"))?;
    Ok((axis.parse()?, state.to_string()))
}

pub(super) fn run(ctx: &Context<'_>, command: DocCommand) -> Result<(), String> {
    match command {
        DocCommand::New {
            name,
            rev,
            stream,
            group,
            ad,
            authors,
            states,
        } => {
            let mut initial = BTreeMap::new();
            for (axis, state) in states {
                if initial.insert(axis, state).is_some() {
                    return Err(format!("--state given twice for {axis}"));
                }
            }
            let new = NewDocument {
                name,
                rev,
                stream,
                group,
                ad,
                authors,
                states: initial,
            };
            cmd_new(ctx, &new)
        }
        DocCommand::Show { name } => cmd_show(ctx, &name),
        DocCommand::History { name, event_type } => cmd_history(ctx, &name, event_type),
        DocCommand::Revise { name, rev } => {
            let result = ctx
                .tracker
                .new_revision(&name, &rev, &ctx.actor()?)
                .map_err(failure)?;
            eprintln!("{name}-{rev} recorded");
            print_json(&result)
        }
        DocCommand::Comment { name, text } => {
            let event = ctx
                .tracker
                .add_comment(&name, &text, &ctx.actor()?)
                .map_err(failure)?;
            print_json(&event)
        }
        DocCommand::Holders { name, people } => {
            let result = ctx
                .tracker
                .set_action_holders(&name, people, &ctx.actor()?)
                .map_err(failure)?;
            eprintln!(
                "{name}: action holders are {}",
                format_holders(&result.document.snapshot.action_holders)
            );
            print_json(&result)
        }
        DocCommand::Verify { name } => {
            if ctx.tracker.verify(&name).map_err(failure)? {
                eprintln!("{name}: snapshot matches history");
                Ok(())
            } else {
                let replayed = ctx.tracker.replay(&name).map_err(failure)?;
                print_json(&replayed)?;
                Err(format!("{name}: stored snapshot differs from replayed history"))
            }
        }
    }
}

fn cmd_new(ctx: &Context<'_>, new: &NewDocument) -> Result<(), String> {
    let result = ctx
        .tracker
        .create_document(new, &ctx.actor()?)
        .map_err(failure)?;
    eprintln!("{} created: {}", new.name, format_states(&result.document));
    print_json(&result)
}

fn cmd_show(ctx: &Context<'_>, name: &str) -> Result<(), String> {
    let document = ctx.tracker.document(name).map_err(failure)?;
    eprintln!(
        "{name}-{}: {}; action holders: {}",
        document.rev(),
        format_states(&document),
        format_holders(&document.snapshot.action_holders)
    );
    print_json(&document)
}

fn cmd_history(ctx: &Context<'_>, name: &str, event_type: Option<EventType>) -> Result<(), String> {
    // Distinguish a missing document from an empty history.
    ctx.tracker.document(name).map_err(failure)?;
    let events = match event_type {
        Some(t) => ctx.tracker.storage().events_of_type(name, t),
        None => ctx.tracker.history(name),
    };
    let events = events
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| failure(e.into()))?;
    print_json(&events)
}
