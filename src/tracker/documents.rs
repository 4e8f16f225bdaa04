//! Document creation, revisions, comments, holder overrides, and replay.

use std::collections::BTreeMap;

use tracing::info;

use crate::{
    action_holders::{self, NEEDS_REVISION},
    error::TrackerError,
    model::{Actor, Axis, DocEvent, Document, EventKind, NewEvent, Person, Snapshot, Stream},
};

use super::{TransitionRequest, TransitionResult, Tracker, outcome, require};

/// Everything needed to register a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub rev: String,
    pub stream: Stream,
    pub group: Option<String>,
    pub ad: Option<Person>,
    pub authors: Vec<Person>,

    /// Initial states. The draft axis starts `active` unless given here.
    pub states: BTreeMap<Axis, String>,
}

impl Tracker {
    /// Registers a document with its first revision and initial states.
    pub fn create_document(
        &self,
        new: &NewDocument,
        actor: &Actor,
    ) -> Result<TransitionResult, TrackerError> {
        let at = self.clock.now();
        let result = self.storage.with_document(&new.name, |unit| {
            if unit.document().is_some() {
                return Err(TrackerError::DocumentAlreadyExists(new.name.clone()));
            }
            unit.insert(Document {
                name: new.name.clone(),
                stream: new.stream,
                group: new.group.clone(),
                ad: new.ad.clone(),
                authors: new.authors.clone(),
                snapshot: Snapshot::default(),
                time: at,
                last_seq: 0,
            })?;
            unit.append(
                NewEvent::new(
                    actor,
                    EventKind::NewRevision {
                        revision: new.rev.clone(),
                        expires: Some(self.expiry.expires_at(at)),
                    },
                    format!("New version available: {}-{}.txt", new.name, new.rev),
                ),
                at,
            )?;

            let mut initial = new.states.clone();
            initial
                .entry(Axis::Draft)
                .or_insert_with(|| "active".to_string());
            for (axis, state) in initial {
                let request = TransitionRequest::new(&new.name, axis, state, actor.clone());
                self.change_state(unit, &request, at)?;
            }
            outcome(unit)
        })?;

        info!(document = %new.name, rev = %new.rev, "document created");
        Ok(result)
    }

    /// Records a new revision and restarts the expiry clock.
    ///
    /// An expired draft comes back to `active`, and an outstanding
    /// `need-rev` tag is cleared.
    pub fn new_revision(
        &self,
        name: &str,
        rev: &str,
        actor: &Actor,
    ) -> Result<TransitionResult, TrackerError> {
        let at = self.clock.now();
        let (result, changes) = self.storage.with_document(name, |unit| {
            let document = require(unit)?;
            unit.append(
                NewEvent::new(
                    actor,
                    EventKind::NewRevision {
                        revision: rev.to_string(),
                        expires: Some(self.expiry.expires_at(at)),
                    },
                    format!("New version available: {name}-{rev}.txt"),
                ),
                at,
            )?;

            let mut changes = Vec::new();
            if document.state(Axis::Draft) == Some("expired") {
                let revive = TransitionRequest::new(name, Axis::Draft, "active", actor.clone());
                changes.extend(self.change_state(unit, &revive, at)?);
            }
            if document.has_tag(NEEDS_REVISION)
                && let Some(iesg) = document.state(Axis::Iesg)
            {
                let clear = TransitionRequest::new(name, Axis::Iesg, iesg, actor.clone())
                    .remove_tag(NEEDS_REVISION);
                changes.extend(self.change_state(unit, &clear, at)?);
            }
            Ok::<_, TrackerError>((outcome(unit)?, changes))
        })?;

        info!(document = name, rev, "new revision");
        for change in &changes {
            self.announce(&result.document, change, actor);
        }
        Ok(result)
    }

    pub fn add_comment(
        &self,
        name: &str,
        text: &str,
        actor: &Actor,
    ) -> Result<DocEvent, TrackerError> {
        let at = self.clock.now();
        self.storage.with_document(name, |unit| {
            require(unit)?;
            Ok(unit.append(NewEvent::new(actor, EventKind::AddedComment, text), at)?)
        })
    }

    /// Replaces the action holders by hand.
    ///
    /// People who stay keep their age. No event is written when the set of
    /// people is unchanged.
    pub fn set_action_holders(
        &self,
        name: &str,
        people: Vec<Person>,
        actor: &Actor,
    ) -> Result<TransitionResult, TrackerError> {
        let at = self.clock.now();
        self.storage.with_document(name, |unit| {
            let document = require(unit)?;
            let prior = &document.snapshot.action_holders;
            let holders = action_holders::with_ages(prior, people, at);
            if !action_holders::same_people(prior, &holders) {
                let description = action_holders::describe(&holders);
                unit.append(
                    NewEvent::new(actor, EventKind::ChangedActionHolders { holders }, description),
                    at,
                )?;
            }
            outcome(unit)
        })
    }

    /// Rebuilds a document's snapshot from its event log alone.
    pub fn replay(&self, name: &str) -> Result<Snapshot, TrackerError> {
        self.document(name)?;
        let events = self
            .storage
            .events_for(name)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Snapshot::replay(&events))
    }

    /// Whether the stored snapshot equals the replay of the event log.
    pub fn verify(&self, name: &str) -> Result<bool, TrackerError> {
        let stored = self.document(name)?;
        Ok(self.replay(name)? == stored.snapshot)
    }
}
