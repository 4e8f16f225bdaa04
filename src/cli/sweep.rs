//! Sweep commands: expire, last-call.

use clap::Subcommand;
use jiff::Timestamp;

use super::format::print_json;
use super::{Context, failure};

#[derive(Debug, Subcommand)]
pub enum SweepCommand {
    /// Expire due drafts and warn authors of drafts about to expire.
    Expire {
        /// Evaluate as of this instant instead of now.
        #[arg(long)]
        as_of: Option<Timestamp>,

        /// List the due drafts without touching them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Return documents whose last call has ended to writeup.
    LastCall {
        #[arg(long)]
        as_of: Option<Timestamp>,

        #[arg(long)]
        dry_run: bool,
    },
}

pub(super) fn run(ctx: &Context<'_>, command: SweepCommand) -> Result<(), String> {
    match command {
        SweepCommand::Expire { as_of, dry_run } => {
            let as_of = as_of.unwrap_or_else(Timestamp::now);
            if dry_run {
                let due = ctx
                    .tracker
                    .find_expirable(as_of)
                    .map(|d| d.map(|d| d.name))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(failure)?;
                return print_json(&due);
            }
            let report = ctx.tracker.sweep_expirations(as_of).map_err(failure)?;
            eprintln!(
                "expired {}, warned {}, failed {}",
                report.expired.len(),
                report.warned.len(),
                report.failed.len()
            );
            print_json(&report)
        }
        SweepCommand::LastCall { as_of, dry_run } => {
            let as_of = as_of.unwrap_or_else(Timestamp::now);
            if dry_run {
                let ended = ctx
                    .tracker
                    .find_expired_last_calls(as_of)
                    .map(|d| d.map(|d| d.name))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(failure)?;
                return print_json(&ended);
            }
            let report = ctx.tracker.sweep_last_calls(as_of).map_err(failure)?;
            eprintln!(
                "ended {}, failed {}",
                report.last_calls.len(),
                report.failed.len()
            );
            print_json(&report)
        }
    }
}
