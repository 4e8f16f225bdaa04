//! State changes on one axis, with their tag and action-holder consequences.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    action_holders::{self, StateChange},
    error::TrackerError,
    model::{Actor, Axis, DocEvent, Document, EventKind, NewEvent},
    notify::StateChanged,
    storage::DocumentTx,
    tags::{self, TagDelta},
};

use super::{Tracker, outcome, require};

/// A requested change of state on one axis.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub document: String,
    pub axis: Axis,
    pub new_state: String,

    /// Recorded before the state change it explains.
    pub comment: Option<String>,
    pub actor: Actor,
    pub tags_add: BTreeSet<String>,
    pub tags_remove: BTreeSet<String>,
}

impl TransitionRequest {
    pub fn new(
        document: impl Into<String>,
        axis: Axis,
        new_state: impl Into<String>,
        actor: Actor,
    ) -> Self {
        Self {
            document: document.into(),
            axis,
            new_state: new_state.into(),
            comment: None,
            actor,
            tags_add: BTreeSet::new(),
            tags_remove: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags_add.insert(tag.into());
        self
    }

    #[must_use]
    pub fn remove_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags_remove.insert(tag.into());
        self
    }
}

/// The document after a committed operation, and the events it created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub document: Document,
    pub events: Vec<DocEvent>,
}

impl Tracker {
    /// Validates and applies one state change.
    ///
    /// Appends, in order: the comment (if any), an action-holder change (if
    /// the set changed), and the state change. Nothing is written when
    /// validation fails.
    pub fn transition(&self, request: &TransitionRequest) -> Result<TransitionResult, TrackerError> {
        let at = self.clock.now();
        let (result, change) = self.storage.with_document(&request.document, |unit| {
            let change = self.change_state(unit, request, at)?;
            Ok::<_, TrackerError>((outcome(unit)?, change))
        })?;

        if let Some(change) = &change {
            info!(
                document = %request.document,
                axis = %change.axis,
                from = change.old.as_deref().unwrap_or("(none)"),
                to = %change.new,
                events = result.events.len(),
                "transition committed"
            );
            self.announce(&result.document, change, &request.actor);
        }
        Ok(result)
    }

    /// Moves the IESG state to `lc` and records when the last call ends.
    pub fn issue_last_call(
        &self,
        name: &str,
        expires: Timestamp,
        actor: &Actor,
    ) -> Result<TransitionResult, TrackerError> {
        let at = self.clock.now();
        let (result, change) = self.storage.with_document(name, |unit| {
            let request = TransitionRequest::new(name, Axis::Iesg, "lc", actor.clone());
            let change = self.change_state(unit, &request, at)?;
            unit.append(
                NewEvent::new(
                    actor,
                    EventKind::LastCallIssued { expires },
                    format!("Last call sent, expires {}", expires.strftime("%Y-%m-%d")),
                ),
                at,
            )?;
            Ok::<_, TrackerError>((outcome(unit)?, change))
        })?;

        info!(document = name, %expires, "last call issued");
        if let Some(change) = &change {
            self.announce(&result.document, change, actor);
        }
        Ok(result)
    }

    /// The shared state-change step, inside an open unit of work.
    ///
    /// Returns the change when a state event was written. Staying in the
    /// current state with no tag change writes only the comment.
    pub(super) fn change_state(
        &self,
        unit: &mut DocumentTx<'_>,
        request: &TransitionRequest,
        at: Timestamp,
    ) -> Result<Option<StateChanged>, TrackerError> {
        let document = require(unit)?;
        let axis = request.axis;
        let group = document.group.as_deref();
        let current = document.state(axis);
        let new = request.new_state.as_str();

        if self.registry.state(axis, new).is_none() {
            return Err(TrackerError::UnknownState {
                axis,
                state: new.to_string(),
            });
        }
        self.check_tags(axis, group, request)?;
        if !self.registry.validate(axis, current, new, group) {
            return Err(TrackerError::InvalidTransition {
                document: document.name.clone(),
                axis,
                current: current.map(str::to_string),
                requested: new.to_string(),
                allowed: self
                    .registry
                    .allowed_next_states(axis, current, group)
                    .iter()
                    .map(|d| d.slug.clone())
                    .collect(),
            });
        }

        let tags = tags::apply_delta(&document.snapshot.tags, &request.tags_add, &request.tags_remove);

        if let Some(comment) = request
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            unit.append(
                NewEvent::new(&request.actor, EventKind::AddedComment, comment),
                at,
            )?;
        }
        if current == Some(new) && tags.is_empty() {
            return Ok(None);
        }

        let change = StateChange {
            axis,
            old: current,
            new,
            tags: &tags,
        };
        let holders = action_holders::resolve(&self.registry, &document, &change, at)
            .inspect_err(|e| {
                error!(document = %document.name, error = %e, "transition aborted");
            })?;
        if !action_holders::same_people(&document.snapshot.action_holders, &holders) {
            let description = action_holders::describe(&holders);
            unit.append(
                NewEvent::new(
                    &request.actor,
                    EventKind::ChangedActionHolders { holders },
                    description,
                ),
                at,
            )?;
        }

        let description = self.describe(axis, current, new, &tags);
        unit.append(
            NewEvent::new(
                &request.actor,
                EventKind::ChangedState {
                    axis,
                    old: current.map(str::to_string),
                    new: new.to_string(),
                    added_tags: tags.added(),
                    removed_tags: tags.removed(),
                },
                description,
            ),
            at,
        )?;
        if axis == Axis::Iesg && current != Some(new) && self.ends_iesg_processing(new) {
            self.close_open_ballots(unit, &request.actor, at)?;
        }

        Ok(Some(StateChanged {
            axis,
            old: current.map(str::to_string),
            new: new.to_string(),
        }))
    }

    /// IESG states that leave no ballot worth keeping open.
    fn ends_iesg_processing(&self, state: &str) -> bool {
        self.registry.clears_action_holders(Axis::Iesg, state)
            || self
                .registry
                .state(Axis::Iesg, state)
                .is_some_and(|d| d.sink)
    }

    /// Added tags must be visible to the group; removed ones need only exist.
    fn check_tags(
        &self,
        axis: Axis,
        group: Option<&str>,
        request: &TransitionRequest,
    ) -> Result<(), TrackerError> {
        let visible = self.registry.visible_tags(axis, group);
        if let Some(tag) = request
            .tags_add
            .iter()
            .find(|tag| !visible.iter().any(|t| t.slug == **tag))
        {
            return Err(TrackerError::UnknownTag {
                axis,
                tag: tag.clone(),
            });
        }
        if let Some(tag) = request
            .tags_remove
            .iter()
            .find(|tag| self.registry.tag(axis, tag).is_none())
        {
            return Err(TrackerError::UnknownTag {
                axis,
                tag: tag.clone(),
            });
        }
        Ok(())
    }

    fn describe(&self, axis: Axis, old: Option<&str>, new: &str, tags: &TagDelta) -> String {
        let state_name = |slug: &str| {
            self.registry
                .state(axis, slug)
                .map_or_else(|| slug.to_string(), |d| d.name.clone())
        };
        let tag_name = |slug: &str| {
            self.registry
                .tag(axis, slug)
                .map_or_else(|| slug.to_string(), |t| t.name.clone())
        };

        let mut parts = Vec::new();
        match old {
            Some(old) if old == new => {}
            Some(old) => parts.push(format!(
                "{} changed to {} from {}",
                axis.label(),
                state_name(new),
                state_name(old)
            )),
            None => parts.push(format!("{} changed to {}", axis.label(), state_name(new))),
        }
        for tag in tags.added() {
            parts.push(format!("Tag {} set", tag_name(&tag)));
        }
        for tag in tags.removed() {
            parts.push(format!("Tag {} cleared", tag_name(&tag)));
        }
        parts.join(". ")
    }
}
