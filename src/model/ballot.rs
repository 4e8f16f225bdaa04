//! Ballots and positions.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::person::{Actor, Person};

/// Identifies a ballot across documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotId(pub Uuid);

impl BallotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BallotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BallotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for BallotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A voting round opened against a document for one purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: BallotId,
    pub document: String,

    /// Purpose slug, e.g. `iesg-approve`.
    pub purpose: String,
    pub opened_by: Actor,
    pub opened_at: Timestamp,
    pub due: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
}

impl Ballot {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// A voter's stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PositionValue {
    #[serde(rename = "yes")]
    Yes,
    #[serde(rename = "noobj")]
    NoObjection,
    #[serde(rename = "discuss")]
    Discuss,
    #[serde(rename = "block")]
    Block,
    #[serde(rename = "abstain")]
    Abstain,
    #[serde(rename = "recuse")]
    Recuse,
    #[serde(rename = "norecord")]
    NoRecord,
    #[serde(rename = "moretime")]
    NeedMoreTime,
    #[serde(rename = "not-ready")]
    NotReady,
}

impl PositionValue {
    pub const ALL: [PositionValue; 9] = [
        PositionValue::Yes,
        PositionValue::NoObjection,
        PositionValue::Discuss,
        PositionValue::Block,
        PositionValue::Abstain,
        PositionValue::Recuse,
        PositionValue::NoRecord,
        PositionValue::NeedMoreTime,
        PositionValue::NotReady,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            PositionValue::Yes => "yes",
            PositionValue::NoObjection => "noobj",
            PositionValue::Discuss => "discuss",
            PositionValue::Block => "block",
            PositionValue::Abstain => "abstain",
            PositionValue::Recuse => "recuse",
            PositionValue::NoRecord => "norecord",
            PositionValue::NeedMoreTime => "moretime",
            PositionValue::NotReady => "not-ready",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PositionValue::Yes => "Yes",
            PositionValue::NoObjection => "No Objection",
            PositionValue::Discuss => "Discuss",
            PositionValue::Block => "Block",
            PositionValue::Abstain => "Abstain",
            PositionValue::Recuse => "Recuse",
            PositionValue::NoRecord => "No Record",
            PositionValue::NeedMoreTime => "Need More Time",
            PositionValue::NotReady => "Not Ready",
        }
    }
}

impl FromStr for PositionValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PositionValue::ALL
            .into_iter()
            .find(|p| p.slug() == s)
            .ok_or_else(|| format!("unknown ballot position: {s}"))
    }
}

/// A recorded position. Superseding positions are new records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub ballot: BallotId,
    pub voter: Person,
    pub value: PositionValue,
    pub comment: Option<String>,
    pub time: Timestamp,

    /// Sequence number of the recording event.
    pub seq: u64,
}
