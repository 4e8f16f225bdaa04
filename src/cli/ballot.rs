//! Ballot commands: open, position, close, show.

use clap::Subcommand;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;

use doctrack::ballot::{self, Tally};
use doctrack::model::{Ballot, BallotId, Position, PositionValue};

use super::format::{format_tally, print_json};
use super::{Context, failure};

#[derive(Debug, Subcommand)]
pub enum BallotCommand {
    /// Open a ballot. Prints the ballot, including its id.
    Open {
        document: String,

        /// Purpose, e.g. `iesg-approve` or `irsg-approve`.
        purpose: String,

        /// Days until the ballot is due.
        #[arg(long)]
        due_days: Option<i64>,
    },

    /// Record the acting person's position.
    Position {
        ballot: BallotId,

        /// e.g. `yes`, `noobj`, `discuss`, `abstain`, `recuse`.
        value: PositionValue,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Tally and close. A ballot that does not pass may stay open.
    Close { ballot: BallotId },

    /// Print a ballot, its current positions, and its tally.
    Show { ballot: BallotId },
}

#[derive(Serialize)]
struct BallotView {
    ballot: Ballot,
    positions: Vec<Position>,
    tally: Tally,
}

pub(super) fn run(ctx: &Context<'_>, command: BallotCommand) -> Result<(), String> {
    match command {
        BallotCommand::Open {
            document,
            purpose,
            due_days,
        } => {
            let due = match due_days {
                Some(days) if days <= 0 => return Err("--due-days must be positive".to_string()),
                Some(days) => Some(Timestamp::now() + SignedDuration::from_hours(days * 24)),
                None => None,
            };
            let opened = ctx
                .tracker
                .open_ballot(&document, &purpose, &ctx.actor()?, due)
                .map_err(failure)?;
            eprintln!("{purpose} ballot {} opened on {document}", opened.id);
            print_json(&opened)
        }
        BallotCommand::Position {
            ballot,
            value,
            comment,
        } => {
            let actor = ctx.actor()?;
            let voter = actor
                .person()
                .ok_or("positions must be recorded by a person")?;
            let position = ctx
                .tracker
                .record_position(ballot, voter, value, comment.as_deref())
                .map_err(failure)?;
            eprintln!("{} recorded {}", voter.name, value.name());
            print_json(&position)
        }
        BallotCommand::Close { ballot } => {
            let result = ctx
                .tracker
                .close_ballot(ballot, &ctx.actor()?)
                .map_err(failure)?;
            let verb = if result.closed { "closed" } else { "left open" };
            eprintln!("ballot {ballot} {verb}; {}", format_tally(&result.tally));
            print_json(&result)
        }
        BallotCommand::Show { ballot } => cmd_show(ctx, ballot),
    }
}

fn cmd_show(ctx: &Context<'_>, id: BallotId) -> Result<(), String> {
    let ballot = ctx.tracker.ballot(id).map_err(failure)?;
    let policy = ctx
        .tracker
        .policies()
        .get(&ballot.purpose)
        .ok_or_else(|| format!("no policy for ballot purpose {:?}", ballot.purpose))?;
    let positions = ctx.tracker.current_positions(id).map_err(failure)?;
    let tally = ballot::tally(policy, &positions);
    eprintln!("{}", format_tally(&tally));
    print_json(&BallotView {
        ballot,
        positions,
        tally,
    })
}
