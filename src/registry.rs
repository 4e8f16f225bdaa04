//! State registry: the catalog of axes, states, tags, and per-group overlays.
//!
//! Two explicit lookup layers. Global defaults come from the seeded catalog;
//! group overrides are sparse and win when present. The registry is built
//! once at startup and shared read-only.

mod catalog;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::model::Axis;

/// One state on one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDef {
    pub axis: Axis,
    pub slug: String,
    pub name: String,

    /// Default transition graph, in display order.
    pub next: Vec<String>,

    /// Retired states stay in the catalog so historic events remain readable.
    pub used: bool,

    /// May be entered from any other state on the axis.
    pub sink: bool,
}

/// A boolean flag scoped to one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDef {
    pub axis: Axis,
    pub slug: String,
    pub name: String,
    pub used: bool,
}

/// A group's sparse overlay on the global catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupOverrides {
    /// Hidden from the group's default lists.
    pub unused_states: BTreeSet<(Axis, String)>,

    /// Hidden from the group's tag editing.
    pub unused_tags: BTreeSet<String>,

    /// Replaces the default next-state list for a state when non-empty.
    pub next_states: BTreeMap<(Axis, String), Vec<String>>,
}

/// The immutable catalog consulted at transition time.
#[derive(Debug, Clone)]
pub struct Registry {
    states: BTreeMap<Axis, Vec<StateDef>>,
    tags: BTreeMap<Axis, Vec<TagDef>>,
    groups: HashMap<String, GroupOverrides>,
    clears_action_holders: BTreeSet<String>,
}

impl Registry {
    /// The seeded IETF catalog with no group overlays.
    pub fn builtin() -> Self {
        let mut states = BTreeMap::new();
        for axis in Axis::ALL {
            let defs = catalog::states(axis)
                .iter()
                .map(|(slug, name, next)| StateDef {
                    axis,
                    slug: (*slug).to_string(),
                    name: (*name).to_string(),
                    next: next.iter().map(|s| (*s).to_string()).collect(),
                    used: true,
                    sink: catalog::SINKS.contains(&(axis, *slug)),
                })
                .collect();
            states.insert(axis, defs);
        }

        let iesg_tags = catalog::IESG_TAGS
            .iter()
            .map(|(slug, name)| TagDef {
                axis: Axis::Iesg,
                slug: (*slug).to_string(),
                name: (*name).to_string(),
                used: true,
            })
            .collect();

        Self {
            states,
            tags: BTreeMap::from([(Axis::Iesg, iesg_tags)]),
            groups: HashMap::new(),
            clears_action_holders: catalog::CLEARS_ACTION_HOLDERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Adds or replaces a group's overlay.
    #[must_use]
    pub fn with_group(mut self, acronym: impl Into<String>, overrides: GroupOverrides) -> Self {
        self.groups.insert(acronym.into(), overrides);
        self
    }

    /// Retires a state globally. Unknown states are ignored.
    #[must_use]
    pub fn with_retired_state(mut self, axis: Axis, slug: &str) -> Self {
        if let Some(def) = self
            .states
            .get_mut(&axis)
            .and_then(|defs| defs.iter_mut().find(|d| d.slug == slug))
        {
            def.used = false;
        }
        self
    }

    pub fn states(&self, axis: Axis) -> &[StateDef] {
        self.states.get(&axis).map_or(&[], Vec::as_slice)
    }

    pub fn state(&self, axis: Axis, slug: &str) -> Option<&StateDef> {
        self.states(axis).iter().find(|d| d.slug == slug)
    }

    pub fn tags(&self, axis: Axis) -> &[TagDef] {
        self.tags.get(&axis).map_or(&[], Vec::as_slice)
    }

    pub fn tag(&self, axis: Axis, slug: &str) -> Option<&TagDef> {
        self.tags(axis).iter().find(|t| t.slug == slug)
    }

    /// Tags a group edits: used tags on the axis minus the group's unused ones.
    pub fn visible_tags(&self, axis: Axis, group: Option<&str>) -> Vec<&TagDef> {
        let overrides = group.and_then(|g| self.groups.get(g));
        self.tags(axis)
            .iter()
            .filter(|t| t.used)
            .filter(|t| overrides.is_none_or(|o| !o.unused_tags.contains(&t.slug)))
            .collect()
    }

    /// Whether entering this state empties the action-holder set.
    pub fn clears_action_holders(&self, axis: Axis, slug: &str) -> bool {
        axis == Axis::Iesg && self.clears_action_holders.contains(slug)
    }

    /// States reachable from `current`.
    ///
    /// With no current state, every used state is a valid initial assignment.
    /// A group override for the `(axis, current)` pair replaces the default
    /// list and is not filtered by the group's unused states; default lists
    /// are. Sink states are reachable from anywhere. Retired states never are.
    pub fn allowed_next_states(
        &self,
        axis: Axis,
        current: Option<&str>,
        group: Option<&str>,
    ) -> Vec<&StateDef> {
        let overrides = group.and_then(|g| self.groups.get(g));
        let hidden = |slug: &str| {
            overrides.is_some_and(|o| o.unused_states.contains(&(axis, slug.to_string())))
        };

        let Some(current) = current else {
            return self
                .states(axis)
                .iter()
                .filter(|d| d.used && !hidden(&d.slug))
                .collect();
        };

        let custom = overrides
            .and_then(|o| o.next_states.get(&(axis, current.to_string())))
            .filter(|next| !next.is_empty());

        let mut slugs: Vec<&str> = match custom {
            Some(next) => next.iter().map(String::as_str).collect(),
            None => self
                .state(axis, current)
                .map(|d| d.next.iter().map(String::as_str).filter(|s| !hidden(s)).collect())
                .unwrap_or_default(),
        };
        for sink in self.states(axis).iter().filter(|d| d.sink) {
            if sink.slug != current && !slugs.contains(&sink.slug.as_str()) {
                slugs.push(&sink.slug);
            }
        }

        slugs
            .into_iter()
            .filter_map(|s| self.state(axis, s))
            .filter(|d| d.used)
            .collect()
    }

    /// Whether `candidate` may be assigned on `axis` given the current state.
    ///
    /// Staying in the current state is always valid (a tag-only change).
    pub fn validate(
        &self,
        axis: Axis,
        current: Option<&str>,
        candidate: &str,
        group: Option<&str>,
    ) -> bool {
        if current == Some(candidate) {
            return self.state(axis, candidate).is_some();
        }
        self.allowed_next_states(axis, current, group)
            .iter()
            .any(|d| d.slug == candidate)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
