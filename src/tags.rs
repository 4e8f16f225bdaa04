//! Tag sets: auxiliary flags riding alongside a state axis.

use std::collections::BTreeSet;

/// The outcome of applying a tag delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDelta {
    pub old: BTreeSet<String>,
    pub new: BTreeSet<String>,
}

impl TagDelta {
    /// Tags present now that were not before.
    pub fn added(&self) -> BTreeSet<String> {
        self.new.difference(&self.old).cloned().collect()
    }

    /// Tags present before that are gone now.
    pub fn removed(&self) -> BTreeSet<String> {
        self.old.difference(&self.new).cloned().collect()
    }

    pub fn newly_added(&self, tag: &str) -> bool {
        self.new.contains(tag) && !self.old.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.old == self.new
    }
}

/// Applies removals then additions. Redundant operations are no-ops.
///
/// A tag named in both sets ends up present.
pub fn apply_delta(
    current: &BTreeSet<String>,
    add: &BTreeSet<String>,
    remove: &BTreeSet<String>,
) -> TagDelta {
    let mut new = current.clone();
    for tag in remove {
        new.remove(tag);
    }
    new.extend(add.iter().cloned());
    TagDelta {
        old: current.clone(),
        new,
    }
}
