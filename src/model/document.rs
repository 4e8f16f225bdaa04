//! Documents: the workflow subject and its materialized snapshot.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{
    event::{DocEvent, EventKind},
    person::Person,
};

/// An independent dimension of document status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "draft-iesg")]
    Iesg,
    #[serde(rename = "draft-stream-ietf")]
    StreamIetf,
    #[serde(rename = "draft-stream-irtf")]
    StreamIrtf,
    #[serde(rename = "draft-stream-iab")]
    StreamIab,
    #[serde(rename = "draft-stream-ise")]
    StreamIse,
    #[serde(rename = "draft-iana-review")]
    IanaReview,
}

impl Axis {
    pub const ALL: [Axis; 7] = [
        Axis::Draft,
        Axis::Iesg,
        Axis::StreamIetf,
        Axis::StreamIrtf,
        Axis::StreamIab,
        Axis::StreamIse,
        Axis::IanaReview,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Axis::Draft => "draft",
            Axis::Iesg => "draft-iesg",
            Axis::StreamIetf => "draft-stream-ietf",
            Axis::StreamIrtf => "draft-stream-irtf",
            Axis::StreamIab => "draft-stream-iab",
            Axis::StreamIse => "draft-stream-ise",
            Axis::IanaReview => "draft-iana-review",
        }
    }

    /// Human-readable label used in event descriptions.
    pub fn label(self) -> &'static str {
        match self {
            Axis::Draft => "State",
            Axis::Iesg => "IESG state",
            Axis::StreamIetf => "IETF WG state",
            Axis::StreamIrtf => "IRTF state",
            Axis::StreamIab => "IAB state",
            Axis::StreamIse => "ISE state",
            Axis::IanaReview => "IANA Review state",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Axis::ALL
            .into_iter()
            .find(|a| a.slug() == s)
            .ok_or_else(|| format!("unknown state axis: {s}"))
    }
}

/// The approval pipeline a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Ietf,
    Irtf,
    Iab,
    Ise,
}

impl Stream {
    pub fn slug(self) -> &'static str {
        match self {
            Stream::Ietf => "ietf",
            Stream::Irtf => "irtf",
            Stream::Iab => "iab",
            Stream::Ise => "ise",
        }
    }

    /// The stream-status axis this stream's documents move along.
    pub fn axis(self) -> Axis {
        match self {
            Stream::Ietf => Axis::StreamIetf,
            Stream::Irtf => Axis::StreamIrtf,
            Stream::Iab => Axis::StreamIab,
            Stream::Ise => Axis::StreamIse,
        }
    }
}

impl FromStr for Stream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ietf" => Ok(Stream::Ietf),
            "irtf" => Ok(Stream::Irtf),
            "iab" => Ok(Stream::Iab),
            "ise" => Ok(Stream::Ise),
            other => Err(format!("unknown stream: {other}")),
        }
    }
}

/// A person currently expected to act on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHolder {
    pub person: Person,

    /// When this person became an action holder. Drives "stale" flags.
    pub since: Timestamp,
}

/// The lifecycle fields of a document that are derived from its event log.
///
/// The commit step and replay both go through [`Snapshot::apply`], so the
/// stored snapshot is always the fold of the stored events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub rev: String,
    pub expires: Option<Timestamp>,
    pub states: BTreeMap<Axis, String>,
    pub tags: BTreeSet<String>,
    pub action_holders: Vec<ActionHolder>,
}

impl Snapshot {
    /// Folds one event into the snapshot.
    pub fn apply(&mut self, event: &DocEvent) {
        match &event.kind {
            EventKind::NewRevision { revision, expires } => {
                self.rev.clone_from(revision);
                self.expires = *expires;
            }
            EventKind::ChangedState {
                axis,
                new,
                added_tags,
                removed_tags,
                ..
            } => {
                self.states.insert(*axis, new.clone());
                for tag in removed_tags {
                    self.tags.remove(tag);
                }
                self.tags.extend(added_tags.iter().cloned());
            }
            EventKind::ChangedActionHolders { holders } => {
                self.action_holders.clone_from(holders);
            }
            EventKind::AddedComment
            | EventKind::CreatedBallot { .. }
            | EventKind::BallotPosition { .. }
            | EventKind::ClosedBallot { .. }
            | EventKind::LastCallIssued { .. }
            | EventKind::Expired
            | EventKind::ExpiryWarningSent { .. } => {}
        }
    }

    /// Rebuilds a snapshot from an ordered event sequence.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a DocEvent>) -> Self {
        let mut snapshot = Self::default();
        for event in events {
            snapshot.apply(event);
        }
        snapshot
    }

    pub fn holder_people(&self) -> Vec<Person> {
        self.action_holders.iter().map(|h| h.person.clone()).collect()
    }
}

/// The workflow subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    pub stream: Stream,

    /// Acronym of the responsible group, if any (e.g. a working group).
    pub group: Option<String>,

    /// Responsible area director.
    pub ad: Option<Person>,
    pub authors: Vec<Person>,

    #[serde(flatten)]
    pub snapshot: Snapshot,

    /// Time of the latest event.
    pub time: Timestamp,

    /// Sequence number of the latest event; events are numbered from 1.
    pub last_seq: u64,
}

impl Document {
    pub fn state(&self, axis: Axis) -> Option<&str> {
        self.snapshot.states.get(&axis).map(String::as_str)
    }

    pub fn rev(&self) -> &str {
        &self.snapshot.rev
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.snapshot.tags.contains(tag)
    }

    /// Folds a freshly committed event into the document.
    pub fn apply(&mut self, event: &DocEvent) {
        self.snapshot.apply(event);
        self.time = event.time;
        self.last_seq = event.seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::Actor;

    fn event(seq: u64, kind: EventKind) -> DocEvent {
        DocEvent {
            id: i64::try_from(seq).unwrap(),
            document: "draft-ietf-quic-foo".into(),
            seq,
            rev: "00".into(),
            actor: Actor::System,
            time: Timestamp::UNIX_EPOCH,
            description: String::new(),
            kind,
        }
    }

    #[test]
    fn axis_slug_round_trips() {
        for axis in Axis::ALL {
            assert_eq!(axis.slug().parse::<Axis>().unwrap(), axis);
        }
        assert!("draft-nope".parse::<Axis>().is_err());
    }

    #[test]
    fn replay_folds_states_and_tags() {
        let events = [
            event(
                1,
                EventKind::NewRevision {
                    revision: "00".into(),
                    expires: None,
                },
            ),
            event(
                2,
                EventKind::ChangedState {
                    axis: Axis::Iesg,
                    old: None,
                    new: "ad-eval".into(),
                    added_tags: BTreeSet::from(["need-rev".to_string(), "point".to_string()]),
                    removed_tags: BTreeSet::new(),
                },
            ),
            event(
                3,
                EventKind::ChangedState {
                    axis: Axis::Iesg,
                    old: Some("ad-eval".into()),
                    new: "lc-req".into(),
                    added_tags: BTreeSet::new(),
                    removed_tags: BTreeSet::from(["point".to_string()]),
                },
            ),
        ];

        let snapshot = Snapshot::replay(&events);
        assert_eq!(snapshot.rev, "00");
        assert_eq!(snapshot.states.get(&Axis::Iesg).unwrap(), "lc-req");
        assert_eq!(snapshot.tags, BTreeSet::from(["need-rev".to_string()]));
    }
}
