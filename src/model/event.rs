//! Document events: the append-only system of record.
//!
//! One event type with a kind discriminant and a kind-specific payload.
//! Events are created once and never mutated or deleted.

use std::{collections::BTreeSet, fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{
    ballot::{BallotId, PositionValue},
    document::{ActionHolder, Axis},
    person::{Actor, Person},
};

/// A committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocEvent {
    /// Storage row id.
    pub id: i64,
    pub document: String,

    /// Position in the document's history, starting at 1.
    pub seq: u64,

    /// Revision in force when the event happened.
    pub rev: String,
    pub actor: Actor,
    pub time: Timestamp,
    pub description: String,

    #[serde(flatten)]
    pub kind: EventKind,
}

/// What happened, with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A document was submitted or a new revision posted.
    NewRevision {
        revision: String,
        expires: Option<Timestamp>,
    },

    /// Free-text comment.
    AddedComment,

    /// State on one axis changed, possibly with a tag delta.
    ChangedState {
        axis: Axis,
        old: Option<String>,
        new: String,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        added_tags: BTreeSet<String>,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        removed_tags: BTreeSet<String>,
    },

    /// The full resulting action-holder set.
    ChangedActionHolders { holders: Vec<ActionHolder> },

    CreatedBallot {
        ballot: BallotId,
        purpose: String,
        due: Option<Timestamp>,
    },

    /// A voter's position. The latest one per (ballot, voter) is current.
    BallotPosition {
        ballot: BallotId,
        voter: Person,
        position: PositionValue,
        comment: Option<String>,
    },

    ClosedBallot { ballot: BallotId, approved: bool },

    LastCallIssued { expires: Timestamp },

    Expired,

    ExpiryWarningSent { expires: Timestamp },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::NewRevision { .. } => EventType::NewRevision,
            EventKind::AddedComment => EventType::AddedComment,
            EventKind::ChangedState { .. } => EventType::ChangedState,
            EventKind::ChangedActionHolders { .. } => EventType::ChangedActionHolders,
            EventKind::CreatedBallot { .. } => EventType::CreatedBallot,
            EventKind::BallotPosition { .. } => EventType::BallotPosition,
            EventKind::ClosedBallot { .. } => EventType::ClosedBallot,
            EventKind::LastCallIssued { .. } => EventType::LastCallIssued,
            EventKind::Expired => EventType::Expired,
            EventKind::ExpiryWarningSent { .. } => EventType::ExpiryWarningSent,
        }
    }
}

/// Event kind discriminant, used for filtered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NewRevision,
    AddedComment,
    ChangedState,
    ChangedActionHolders,
    CreatedBallot,
    BallotPosition,
    ClosedBallot,
    LastCallIssued,
    Expired,
    ExpiryWarningSent,
}

impl EventType {
    const ALL: [EventType; 10] = [
        EventType::NewRevision,
        EventType::AddedComment,
        EventType::ChangedState,
        EventType::ChangedActionHolders,
        EventType::CreatedBallot,
        EventType::BallotPosition,
        EventType::ClosedBallot,
        EventType::LastCallIssued,
        EventType::Expired,
        EventType::ExpiryWarningSent,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            EventType::NewRevision => "new_revision",
            EventType::AddedComment => "added_comment",
            EventType::ChangedState => "changed_state",
            EventType::ChangedActionHolders => "changed_action_holders",
            EventType::CreatedBallot => "created_ballot",
            EventType::BallotPosition => "ballot_position",
            EventType::ClosedBallot => "closed_ballot",
            EventType::LastCallIssued => "last_call_issued",
            EventType::Expired => "expired",
            EventType::ExpiryWarningSent => "expiry_warning_sent",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.slug() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// An event waiting to be committed. Storage assigns id, seq, rev and time.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub actor: Actor,
    pub description: String,
    pub kind: EventKind,
}

impl NewEvent {
    pub fn new(actor: &Actor, kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            actor: actor.clone(),
            description: description.into(),
            kind,
        }
    }
}
