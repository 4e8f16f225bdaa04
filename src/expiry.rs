//! Draft expiry rules.
//!
//! [`is_expirable`] is the one predicate behind both the single-document
//! check and the bulk sweep, so the two always agree.

use jiff::{SignedDuration, Timestamp};

use crate::model::{Axis, Document};

/// IESG states that leave a draft on its own clock.
const IESG_IDLE: &[&str] = &["idexists", "dead"];

/// Stream states past which the RFC Editor owns the document.
const STREAM_AT_RFC_EDITOR: &[&str] = &["rfc-edit", "pub"];

/// Tag marking a document under RFC Editor review.
const RFC_EDITOR_REVIEW: &str = "rfc-rev";

/// Draft lifetime and warning window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub lifetime: SignedDuration,

    /// How far ahead of expiry the authors are warned.
    pub warning: SignedDuration,
}

/// Longest lifetime or warning window accepted, in days.
pub const MAX_DAYS: i64 = 36_525;

impl ExpiryPolicy {
    /// `None` unless both values are within `0..=MAX_DAYS`.
    pub fn from_days(lifetime: i64, warning: i64) -> Option<Self> {
        let days = |n: i64| {
            (0..=MAX_DAYS)
                .contains(&n)
                .then(|| SignedDuration::from_secs(n * 86_400))
        };
        Some(Self {
            lifetime: days(lifetime)?,
            warning: days(warning)?,
        })
    }

    /// Saturates at the latest representable instant.
    pub fn expires_at(&self, posted: Timestamp) -> Timestamp {
        posted.checked_add(self.lifetime).unwrap_or(Timestamp::MAX)
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            lifetime: SignedDuration::from_hours(185 * 24),
            warning: SignedDuration::from_hours(14 * 24),
        }
    }
}

/// Whether the document is on the draft-expiry clock at all.
///
/// An active draft the IESG is not processing, that no stream has handed to
/// the RFC Editor, and that is not under RFC Editor review.
pub fn is_expirable(document: &Document) -> bool {
    document.snapshot.expires.is_some()
        && document.state(Axis::Draft) == Some("active")
        && document.state(Axis::Iesg).is_none_or(|s| IESG_IDLE.contains(&s))
        && [Axis::StreamIrtf, Axis::StreamIab, Axis::StreamIse]
            .into_iter()
            .all(|axis| document.state(axis).is_none_or(|s| !STREAM_AT_RFC_EDITOR.contains(&s)))
        && !document.has_tag(RFC_EDITOR_REVIEW)
}

/// Expirable and past its expiry as of `as_of`.
pub fn is_due(document: &Document, as_of: Timestamp) -> bool {
    is_expirable(document) && document.snapshot.expires.is_some_and(|e| e <= as_of)
}

/// Expirable and expiring within the warning window after `as_of`.
pub fn needs_warning(document: &Document, policy: &ExpiryPolicy, as_of: Timestamp) -> bool {
    is_expirable(document)
        && document
            .snapshot
            .expires
            .is_some_and(|e| {
                e > as_of && e <= as_of.checked_add(policy.warning).unwrap_or(Timestamp::MAX)
            })
}
