//! Action-holder resolution: who must act next.
//!
//! A pure function of the transition. Wall-clock time enters only as the
//! `since` stamp for newly inserted holders.

use jiff::Timestamp;

use crate::{
    error::TrackerError,
    model::{ActionHolder, Axis, Document, Person},
    registry::Registry,
    tags::TagDelta,
};

/// Tag whose addition puts the authors on the hook.
pub const NEEDS_REVISION: &str = "need-rev";

/// A state change as the resolver sees it.
#[derive(Debug, Clone, Copy)]
pub struct StateChange<'a> {
    pub axis: Axis,
    pub old: Option<&'a str>,
    pub new: &'a str,
    pub tags: &'a TagDelta,
}

/// Computes the action-holder set after `change`.
///
/// - Entering a clearing state empties the set.
/// - Otherwise the prior set is kept; an IESG state change adds the
///   responsible AD when there is one, and newly adding `need-rev` adds the
///   authors. Removing `need-rev` removes nobody.
///
/// Holders who were already present keep their `since`; new ones get `at`.
pub fn resolve(
    registry: &Registry,
    document: &Document,
    change: &StateChange<'_>,
    at: Timestamp,
) -> Result<Vec<ActionHolder>, TrackerError> {
    let prior = &document.snapshot.action_holders;

    if change.axis != Axis::Iesg {
        if !change.tags.is_empty() {
            return Err(TrackerError::InconsistentActionHolderState(format!(
                "tag change on {} for {} has no action-holder rule",
                change.axis, document.name
            )));
        }
        return Ok(prior.clone());
    }

    if registry.state(Axis::Iesg, change.new).is_none() {
        return Err(TrackerError::InconsistentActionHolderState(format!(
            "no action-holder rule for IESG state {:?} on {}",
            change.new, document.name
        )));
    }

    if registry.clears_action_holders(Axis::Iesg, change.new) {
        return Ok(Vec::new());
    }

    let mut people: Vec<Person> = prior.iter().map(|h| h.person.clone()).collect();
    let mut add = |person: &Person| {
        if !people.iter().any(|p| p.same_as(person)) {
            people.push(person.clone());
        }
    };

    if change.old != Some(change.new)
        && let Some(ad) = &document.ad
    {
        add(ad);
    }
    if change.tags.newly_added(NEEDS_REVISION) {
        for author in &document.authors {
            add(author);
        }
    }

    Ok(with_ages(prior, people, at))
}

/// Builds a holder list for `people`, keeping `since` for anyone in `prior`.
pub fn with_ages(prior: &[ActionHolder], people: Vec<Person>, at: Timestamp) -> Vec<ActionHolder> {
    let mut holders: Vec<ActionHolder> = Vec::with_capacity(people.len());
    for person in people {
        if holders.iter().any(|h| h.person.same_as(&person)) {
            continue;
        }
        let since = prior
            .iter()
            .find(|h| h.person.same_as(&person))
            .map_or(at, |h| h.since);
        holders.push(ActionHolder { person, since });
    }
    holders
}

/// Whether two holder lists name the same people, ignoring order and ages.
pub fn same_people(a: &[ActionHolder], b: &[ActionHolder]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|x| b.iter().any(|y| x.person.same_as(&y.person)))
}

/// Event description for a holder change.
pub fn describe(holders: &[ActionHolder]) -> String {
    if holders.is_empty() {
        return "Removed all action holders".to_string();
    }
    let names: Vec<&str> = holders.iter().map(|h| h.person.name.as_str()).collect();
    format!("Changed action holders to {}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeSet;

    use crate::tags::apply_delta;
    use crate::testing;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| (*t).to_string()).collect()
    }

    fn no_tags() -> TagDelta {
        apply_delta(&BTreeSet::new(), &BTreeSet::new(), &BTreeSet::new())
    }

    fn resolve_iesg(doc: &Document, old: &str, new: &str, tags: &TagDelta) -> Vec<ActionHolder> {
        let change = StateChange {
            axis: Axis::Iesg,
            old: Some(old),
            new,
            tags,
        };
        resolve(&Registry::builtin(), doc, &change, testing::t0()).unwrap()
    }

    #[test]
    fn clearing_state_empties_everything() {
        let mut doc = testing::document("draft-ietf-quic-foo");
        doc.snapshot.action_holders = with_ages(&[], doc.authors.clone(), testing::t0());
        let tags = apply_delta(&BTreeSet::new(), &set(&["need-rev"]), &BTreeSet::new());

        for state in ["approved", "ann", "rfcqueue", "pub", "dead", "idexists"] {
            assert!(resolve_iesg(&doc, "iesg-eva", state, &tags).is_empty(), "{state}");
        }
    }

    #[test]
    fn state_change_adds_ad() {
        let doc = testing::document("draft-ietf-quic-foo");
        let holders = resolve_iesg(&doc, "pub-req", "ad-eval", &no_tags());
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].person, testing::ad());
        assert_eq!(holders[0].since, testing::t0());
    }

    #[test]
    fn missing_ad_is_omitted() {
        let mut doc = testing::document("draft-ietf-quic-foo");
        doc.ad = None;
        assert!(resolve_iesg(&doc, "pub-req", "ad-eval", &no_tags()).is_empty());
    }

    #[test]
    fn need_rev_adds_authors() {
        let doc = testing::document("draft-ietf-quic-foo");
        let tags = apply_delta(&BTreeSet::new(), &set(&["need-rev"]), &BTreeSet::new());
        let holders = resolve_iesg(&doc, "ad-eval", "review-e", &tags);
        let people: Vec<Person> = holders.into_iter().map(|h| h.person).collect();
        assert!(people.contains(&testing::ad()));
        for author in &doc.authors {
            assert!(people.contains(author));
        }
    }

    #[test]
    fn removing_need_rev_keeps_authors() {
        let mut doc = testing::document("draft-ietf-quic-foo");
        doc.snapshot.action_holders = with_ages(&[], doc.authors.clone(), testing::t0());
        let tags = apply_delta(&set(&["need-rev"]), &BTreeSet::new(), &set(&["need-rev"]));
        let holders = resolve_iesg(&doc, "ad-eval", "ad-eval", &tags);
        assert!(same_people(&holders, &doc.snapshot.action_holders));
    }

    #[test]
    fn existing_holders_keep_their_age() {
        let mut doc = testing::document("draft-ietf-quic-foo");
        let earlier = testing::t0() - testing::days(30);
        doc.snapshot.action_holders = vec![ActionHolder {
            person: testing::ad(),
            since: earlier,
        }];
        let tags = apply_delta(&BTreeSet::new(), &set(&["need-rev"]), &BTreeSet::new());
        let holders = resolve_iesg(&doc, "ad-eval", "review-e", &tags);

        let ad = holders.iter().find(|h| h.person == testing::ad()).unwrap();
        assert_eq!(ad.since, earlier);
        let author = holders.iter().find(|h| h.person == doc.authors[0]).unwrap();
        assert_eq!(author.since, testing::t0());
    }

    #[test]
    fn other_axes_leave_holders_alone() {
        let mut doc = testing::document("draft-ietf-quic-foo");
        doc.snapshot.action_holders = with_ages(&[], vec![testing::ad()], testing::t0());
        let tags = no_tags();
        let change = StateChange {
            axis: Axis::StreamIetf,
            old: Some("wg-doc"),
            new: "dead",
            tags: &tags,
        };
        let holders = resolve(&Registry::builtin(), &doc, &change, testing::t0()).unwrap();
        assert_eq!(holders, doc.snapshot.action_holders);
    }

    #[test]
    fn tags_on_other_axes_are_inconsistent() {
        let doc = testing::document("draft-ietf-quic-foo");
        let tags = apply_delta(&BTreeSet::new(), &set(&["need-rev"]), &BTreeSet::new());
        let change = StateChange {
            axis: Axis::StreamIetf,
            old: Some("wg-doc"),
            new: "wg-lc",
            tags: &tags,
        };
        let err = resolve(&Registry::builtin(), &doc, &change, testing::t0()).unwrap_err();
        assert!(matches!(err, TrackerError::InconsistentActionHolderState(_)));
    }

    #[test]
    fn descriptions() {
        assert_eq!(describe(&[]), "Removed all action holders");
        let holders = with_ages(&[], vec![testing::ad()], testing::t0());
        assert_eq!(describe(&holders), "Changed action holders to Ada Director");
    }
}
