//! Core data model for doctrack.
//!
//! Documents and their per-axis states, the events that make up their
//! history, ballots, positions, and the people who act on them.

mod ballot;
mod document;
mod event;
mod person;

pub use ballot::{Ballot, BallotId, Position, PositionValue};
pub use document::{ActionHolder, Axis, Document, Snapshot, Stream};
pub use event::{DocEvent, EventKind, EventType, NewEvent};
pub use person::{Actor, Person};
