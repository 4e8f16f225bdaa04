//! Ballot lifecycle: open, record positions, close.

use jiff::Timestamp;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    ballot::{self, Tally},
    error::TrackerError,
    model::{
        Actor, Ballot, BallotId, DocEvent, Document, EventKind, EventType, NewEvent, Person,
        Position, PositionValue,
    },
    storage::DocumentTx,
};

use super::{TransitionRequest, Tracker, require};

/// Outcome of a close request.
///
/// `closed` is false when the policy keeps a non-approved ballot open; in
/// that case nothing was written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedBallot {
    pub ballot: Ballot,
    pub tally: Tally,
    pub closed: bool,
    pub document: Document,
    pub events: Vec<DocEvent>,
}

impl Tracker {
    /// Opens a ballot. At most one ballot per document and purpose is open.
    pub fn open_ballot(
        &self,
        name: &str,
        purpose: &str,
        actor: &Actor,
        due: Option<Timestamp>,
    ) -> Result<Ballot, TrackerError> {
        let policy = self
            .policies
            .get(purpose)
            .ok_or_else(|| TrackerError::UnknownPurpose(purpose.to_string()))?;
        let at = self.clock.now();

        let ballot = self.storage.with_document(name, |unit| {
            require(unit)?;
            if let Some(open) = unit.open_ballot_for(purpose)? {
                return Err(TrackerError::BallotAlreadyOpen {
                    document: name.to_string(),
                    purpose: purpose.to_string(),
                    ballot: open.id.to_string(),
                });
            }
            let ballot = Ballot {
                id: BallotId::new(),
                document: name.to_string(),
                purpose: purpose.to_string(),
                opened_by: actor.clone(),
                opened_at: at,
                due,
                closed_at: None,
            };
            unit.insert_ballot(&ballot)?;
            unit.append(
                NewEvent::new(
                    actor,
                    EventKind::CreatedBallot {
                        ballot: ballot.id,
                        purpose: purpose.to_string(),
                        due,
                    },
                    format!("Created \"{}\" ballot", policy.name),
                ),
                at,
            )?;
            Ok(ballot)
        })?;

        info!(document = name, purpose, ballot = %ballot.id, "ballot opened");
        Ok(ballot)
    }

    /// Records a position. Earlier positions by the same voter stay in the
    /// history; the latest one is current.
    pub fn record_position(
        &self,
        id: BallotId,
        voter: &Person,
        value: PositionValue,
        comment: Option<&str>,
    ) -> Result<Position, TrackerError> {
        let ballot = self.ballot(id)?;
        let policy = self
            .policies
            .get(&ballot.purpose)
            .ok_or_else(|| TrackerError::UnknownPurpose(ballot.purpose.clone()))?;
        if !policy.allows(value) {
            return Err(TrackerError::InvalidPosition {
                purpose: ballot.purpose.clone(),
                position: value.slug().to_string(),
            });
        }
        let at = self.clock.now();
        let actor = Actor::from(voter.clone());
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());

        let event = self.storage.with_document(&ballot.document, |unit| {
            open_ballot(unit, id)?;
            Ok::<_, TrackerError>(unit.append(
                NewEvent::new(
                    &actor,
                    EventKind::BallotPosition {
                        ballot: id,
                        voter: voter.clone(),
                        position: value,
                        comment: comment.map(str::to_string),
                    },
                    format!(
                        "[Ballot Position Update] New position, {}, has been recorded for {}",
                        value.name(),
                        voter.name
                    ),
                ),
                at,
            )?)
        })?;

        debug!(ballot = %id, voter = %voter.email, position = value.slug(), "position recorded");
        Ok(Position {
            ballot: id,
            voter: voter.clone(),
            value,
            comment: comment.map(str::to_string),
            time: event.time,
            seq: event.seq,
        })
    }

    /// The latest position of each voter.
    pub fn current_positions(&self, id: BallotId) -> Result<Vec<Position>, TrackerError> {
        let ballot = self.ballot(id)?;
        let history = self
            .storage
            .events_of_type(&ballot.document, EventType::BallotPosition)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ballot::current_positions(
            history.iter().filter_map(|e| position_of(e, id)),
        ))
    }

    pub fn ballot(&self, id: BallotId) -> Result<Ballot, TrackerError> {
        self.storage
            .load_ballot(id)?
            .ok_or_else(|| TrackerError::BallotNotFound(id.to_string()))
    }

    pub fn ballots(&self, name: &str) -> Result<Vec<Ballot>, TrackerError> {
        self.document(name)?;
        Ok(self.storage.ballots_for(name)?)
    }

    /// Tallies and closes a ballot, applying the policy's approval state.
    ///
    /// Closing a closed ballot changes nothing. Under a policy that requires
    /// approval to close, a ballot that does not pass stays open. An approved
    /// ballot closes even when its approval state is no longer reachable.
    pub fn close_ballot(&self, id: BallotId, actor: &Actor) -> Result<ClosedBallot, TrackerError> {
        let ballot = self.ballot(id)?;
        let policy = self
            .policies
            .get(&ballot.purpose)
            .ok_or_else(|| TrackerError::UnknownPurpose(ballot.purpose.clone()))?;
        let at = self.clock.now();

        let (result, change) = self.storage.with_document(&ballot.document, |unit| {
            let ballot = unit
                .ballot(id)?
                .ok_or_else(|| TrackerError::BallotNotFound(id.to_string()))?;
            let history = unit.events_of_type(EventType::BallotPosition)?;
            let positions =
                ballot::current_positions(history.iter().filter_map(|e| position_of(e, id)));
            let tally = ballot::tally(policy, &positions);

            let closing = ballot.is_open() && (tally.approved || !policy.require_approval_to_close);
            let mut change = None;
            if closing {
                unit.mark_ballot_closed(id, at)?;
                unit.append(
                    NewEvent::new(
                        actor,
                        EventKind::ClosedBallot {
                            ballot: id,
                            approved: tally.approved,
                        },
                        format!(
                            "Closed \"{}\" ballot ({})",
                            policy.name,
                            if tally.approved { "approved" } else { "not approved" }
                        ),
                    ),
                    at,
                )?;
                if tally.approved
                    && let Some((axis, state)) = &policy.on_approval
                {
                    let request = TransitionRequest::new(&ballot.document, *axis, state, actor.clone());
                    match self.change_state(unit, &request, at) {
                        Ok(moved) => change = moved,
                        // The document moved on while the ballot was open.
                        Err(TrackerError::InvalidTransition { current, .. }) => warn!(
                            document = %ballot.document,
                            ballot = %id,
                            axis = %axis,
                            from = current.as_deref().unwrap_or("(none)"),
                            to = %state,
                            "approval state unreachable; ballot closed without a state change"
                        ),
                        Err(e) => return Err(e),
                    }
                }
            }

            let ballot = unit.ballot(id)?.unwrap_or(ballot);
            let result = ClosedBallot {
                closed: !ballot.is_open(),
                ballot,
                tally,
                document: require(unit)?,
                events: unit.appended().to_vec(),
            };
            Ok::<_, TrackerError>((result, change))
        })?;

        if result.events.is_empty() {
            debug!(ballot = %id, closed = result.closed, "ballot close changed nothing");
        } else {
            info!(
                document = %ballot.document,
                ballot = %id,
                approved = result.tally.approved,
                "ballot closed"
            );
        }
        if let Some(change) = &change {
            self.announce(&result.document, change, actor);
        }
        Ok(result)
    }

    /// Closes every open ballot on the document without applying approval
    /// states. Used when the IESG stops processing the document.
    pub(super) fn close_open_ballots(
        &self,
        unit: &mut DocumentTx<'_>,
        actor: &Actor,
        at: Timestamp,
    ) -> Result<(), TrackerError> {
        for ballot in unit.open_ballots()? {
            let name = self
                .policies
                .get(&ballot.purpose)
                .map_or_else(|| ballot.purpose.clone(), |p| p.name.clone());
            unit.mark_ballot_closed(ballot.id, at)?;
            unit.append(
                NewEvent::new(
                    actor,
                    EventKind::ClosedBallot {
                        ballot: ballot.id,
                        approved: false,
                    },
                    format!("Closed \"{name}\" ballot (no longer in IESG processing)"),
                ),
                at,
            )?;
            info!(document = %ballot.document, ballot = %ballot.id, "open ballot closed");
        }
        Ok(())
    }
}

/// The ballot, if it exists and is still open.
fn open_ballot(unit: &DocumentTx<'_>, id: BallotId) -> Result<Ballot, TrackerError> {
    let ballot = unit
        .ballot(id)?
        .ok_or_else(|| TrackerError::BallotNotFound(id.to_string()))?;
    if !ballot.is_open() {
        return Err(TrackerError::BallotNotOpen(id.to_string()));
    }
    Ok(ballot)
}

/// The position an event records on `ballot`, if it is one.
fn position_of(event: &DocEvent, ballot: BallotId) -> Option<Position> {
    match &event.kind {
        EventKind::BallotPosition {
            ballot: b,
            voter,
            position,
            comment,
        } if *b == ballot => Some(Position {
            ballot,
            voter: voter.clone(),
            value: *position,
            comment: comment.clone(),
            time: event.time,
            seq: event.seq,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    use crate::model::Axis;
    use crate::notify::Audience;
    use crate::testing::{self, Harness};

    const DOC: &str = "draft-ietf-quic-bar";

    fn voter(n: usize) -> Person {
        Person::new(format!("Voter {n}"), format!("v{n}@ietf.org"))
    }

    fn in_evaluation() -> Harness {
        let h = testing::harness();
        let mut new = testing::new_document(DOC);
        new.states = BTreeMap::from([(Axis::Iesg, "iesg-eva".to_string())]);
        h.tracker.create_document(&new, &testing::ad_actor()).unwrap();
        h.notifier.clear();
        h
    }

    #[test]
    fn one_open_ballot_per_purpose() {
        let h = in_evaluation();
        let due = testing::t0() + testing::days(14);
        let ballot = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), Some(due))
            .unwrap();
        assert!(ballot.is_open());
        assert_eq!(ballot.due, Some(due));

        let err = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap_err();
        let TrackerError::BallotAlreadyOpen { ballot: open, .. } = &err else {
            panic!("expected BallotAlreadyOpen, got {err}");
        };
        assert_eq!(*open, ballot.id.to_string());

        // A different purpose is independent.
        h.tracker
            .open_ballot(DOC, "irsg-approve", &testing::ad_actor(), None)
            .unwrap();
        assert_eq!(h.tracker.ballots(DOC).unwrap().len(), 2);

        let created = h
            .tracker
            .storage()
            .latest(DOC, Some(EventType::CreatedBallot))
            .unwrap()
            .unwrap();
        assert_eq!(created.description, "Created \"IRSG approval\" ballot");
    }

    #[test]
    fn discuss_holds_the_ballot_open_until_cleared() {
        let h = in_evaluation();
        let ballot = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
        h.tracker
            .record_position(ballot.id, &voter(1), PositionValue::Discuss, Some("Section 4 is unclear."))
            .unwrap();

        let first = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(!first.closed);
        assert!(first.events.is_empty());
        assert_eq!(first.tally.blocking, [voter(1)]);
        assert_eq!(first.document.state(Axis::Iesg), Some("iesg-eva"));
        assert!(h.tracker.ballot(ballot.id).unwrap().is_open());

        h.tracker
            .record_position(ballot.id, &voter(1), PositionValue::Yes, None)
            .unwrap();
        let second = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(second.closed);
        assert!(second.tally.approved);
        assert_eq!(second.document.state(Axis::Iesg), Some("approved"));
        assert!(!second.ballot.is_open());
        let approvals = second
            .events
            .iter()
            .filter(|e| matches!(&e.kind, EventKind::ChangedState { new, .. } if new == "approved"))
            .count();
        assert_eq!(approvals, 1);
        assert!(
            h.notifier
                .sent()
                .iter()
                .any(|n| n.audience == Audience::DocumentList && n.template == "iesg-approved")
        );

        // Closing again is a no-op.
        let third = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(third.closed);
        assert!(third.events.is_empty());
        assert_eq!(third.document, second.document);
        assert_eq!(
            h.tracker
                .storage()
                .events_of_type(DOC, EventType::ClosedBallot)
                .count(),
            1
        );
    }

    #[test]
    fn positions_are_superseded_not_overwritten() {
        let h = in_evaluation();
        let ballot = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
        let first = h
            .tracker
            .record_position(ballot.id, &voter(1), PositionValue::Discuss, None)
            .unwrap();
        h.clock.advance(testing::days(1));
        let second = h
            .tracker
            .record_position(ballot.id, &voter(1), PositionValue::NoObjection, None)
            .unwrap();
        assert!(second.seq > first.seq);

        let current = h.tracker.current_positions(ballot.id).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].value, PositionValue::NoObjection);
        assert_eq!(
            h.tracker
                .storage()
                .events_of_type(DOC, EventType::BallotPosition)
                .count(),
            2
        );
    }

    #[test]
    fn positions_are_checked_against_the_purpose() {
        let h = in_evaluation();
        let ballot = h
            .tracker
            .open_ballot(DOC, "irsg-approve", &testing::ad_actor(), None)
            .unwrap();
        let err = h
            .tracker
            .record_position(ballot.id, &voter(1), PositionValue::Discuss, None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidPosition { .. }));

        let err = h
            .tracker
            .record_position(BallotId::new(), &voter(1), PositionValue::Yes, None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::BallotNotFound(_)));

        let err = h
            .tracker
            .open_ballot(DOC, "iab-approve", &testing::ad_actor(), None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::UnknownPurpose(_)));
    }

    #[test]
    fn closed_ballots_take_no_positions() {
        let h = in_evaluation();
        let ballot = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
        h.tracker
            .record_position(ballot.id, &voter(1), PositionValue::Yes, None)
            .unwrap();
        h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();

        let err = h
            .tracker
            .record_position(ballot.id, &voter(2), PositionValue::Discuss, None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::BallotNotOpen(_)));

        // The purpose is free for a new round.
        h.tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
    }

    #[test]
    fn leaving_iesg_processing_closes_open_ballots() {
        let h = in_evaluation();
        let ballot = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
        h.tracker
            .record_position(ballot.id, &voter(1), PositionValue::Yes, None)
            .unwrap();

        let result = h
            .tracker
            .transition(&TransitionRequest::new(DOC, Axis::Iesg, "dead", testing::ad_actor()))
            .unwrap();
        let closed = result
            .events
            .iter()
            .find(|e| matches!(e.kind, EventKind::ClosedBallot { ballot: b, .. } if b == ballot.id))
            .expect("ballot closed with the state change");
        assert!(matches!(closed.kind, EventKind::ClosedBallot { approved: false, .. }));
        assert!(!h.tracker.ballot(ballot.id).unwrap().is_open());

        // Closing afterwards is a no-op, and the purpose is free again.
        let again = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(again.closed);
        assert!(again.events.is_empty());
        assert_eq!(again.document.state(Axis::Iesg), Some("dead"));
        h.tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
    }

    #[test]
    fn staying_in_evaluation_keeps_ballots_open() {
        let h = in_evaluation();
        let ballot = h
            .tracker
            .open_ballot(DOC, "iesg-approve", &testing::ad_actor(), None)
            .unwrap();
        h.tracker
            .transition(
                &TransitionRequest::new(DOC, Axis::Iesg, "iesg-eva", testing::ad_actor())
                    .add_tag("point"),
            )
            .unwrap();
        assert!(h.tracker.ballot(ballot.id).unwrap().is_open());
    }

    #[test]
    fn unreachable_approval_state_still_closes() {
        let h = testing::harness();
        let mut new = testing::new_document("draft-irtf-cfrg-qux");
        new.stream = crate::model::Stream::Irtf;
        new.group = Some("cfrg".into());
        new.states = BTreeMap::from([(Axis::StreamIrtf, "pub".to_string())]);
        h.tracker.create_document(&new, &testing::ad_actor()).unwrap();
        h.notifier.clear();

        let ballot = h
            .tracker
            .open_ballot("draft-irtf-cfrg-qux", "irsg-approve", &testing::ad_actor(), None)
            .unwrap();
        for n in 1..=2 {
            h.tracker
                .record_position(ballot.id, &voter(n), PositionValue::Yes, None)
                .unwrap();
        }

        let result = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(result.closed);
        assert!(result.tally.approved);
        assert_eq!(result.document.state(Axis::StreamIrtf), Some("pub"));
        assert_eq!(
            result
                .events
                .iter()
                .map(|e| e.kind.event_type())
                .collect::<Vec<_>>(),
            [EventType::ClosedBallot]
        );
        assert!(h.notifier.sent().is_empty());
        h.tracker
            .open_ballot("draft-irtf-cfrg-qux", "irsg-approve", &testing::ad_actor(), None)
            .unwrap();
    }

    #[test]
    fn irsg_needs_two_approvals() {
        let h = testing::harness();
        let mut new = testing::new_document("draft-irtf-cfrg-baz");
        new.stream = crate::model::Stream::Irtf;
        new.group = Some("cfrg".into());
        new.states = BTreeMap::from([(Axis::StreamIrtf, "irsgpoll".to_string())]);
        h.tracker.create_document(&new, &testing::ad_actor()).unwrap();

        let ballot = h
            .tracker
            .open_ballot("draft-irtf-cfrg-baz", "irsg-approve", &testing::ad_actor(), None)
            .unwrap();
        h.tracker
            .record_position(ballot.id, &voter(1), PositionValue::Yes, None)
            .unwrap();
        h.tracker
            .record_position(ballot.id, &voter(2), PositionValue::NeedMoreTime, None)
            .unwrap();
        let pending = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(!pending.closed);
        assert_eq!(pending.tally.required, 2);

        h.tracker
            .record_position(ballot.id, &voter(3), PositionValue::Yes, None)
            .unwrap();
        let done = h.tracker.close_ballot(ballot.id, &testing::ad_actor()).unwrap();
        assert!(done.closed);
        assert_eq!(done.document.state(Axis::StreamIrtf), Some("rfc-edit"));
    }
}
