//! Output formatting for CLI display.

use serde::Serialize;

use doctrack::ballot::Tally;
use doctrack::model::{ActionHolder, Document};

/// Pretty-print a value as JSON on stdout.
pub(super) fn print_json(value: &impl Serialize) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}

/// One-line summary of a document's states, for stderr.
pub(super) fn format_states(document: &Document) -> String {
    let states: Vec<String> = document
        .snapshot
        .states
        .iter()
        .map(|(axis, state)| format!("{axis}={state}"))
        .collect();
    if states.is_empty() {
        return "no states".to_string();
    }
    states.join(", ")
}

pub(super) fn format_holders(holders: &[ActionHolder]) -> String {
    if holders.is_empty() {
        return "nobody".to_string();
    }
    holders
        .iter()
        .map(|h| h.person.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(super) fn format_tally(tally: &Tally) -> String {
    let verdict = if tally.approved { "approved" } else { "not approved" };
    format!(
        "{verdict}: {} of {} approvals, {} blocking, {} abstaining, {} no record",
        tally.approving.len(),
        tally.required,
        tally.blocking.len(),
        tally.abstaining.len(),
        tally.no_record.len()
    )
}
