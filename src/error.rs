//! Errors surfaced by tracker operations.

use crate::{model::Axis, storage::StorageError};

/// Everything a tracker operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(
        "{document}: cannot move {axis} from {} to {requested}; allowed: {}",
        .current.as_deref().unwrap_or("(none)"),
        list(.allowed)
    )]
    InvalidTransition {
        document: String,
        axis: Axis,
        current: Option<String>,
        requested: String,
        allowed: Vec<String>,
    },

    #[error("unknown state {state:?} on {axis}")]
    UnknownState { axis: Axis, state: String },

    #[error("unknown tag {tag:?} on {axis}")]
    UnknownTag { axis: Axis, tag: String },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("document already exists: {0}")]
    DocumentAlreadyExists(String),

    #[error("{document} already has an open {purpose} ballot ({ballot})")]
    BallotAlreadyOpen {
        document: String,
        purpose: String,
        ballot: String,
    },

    #[error("ballot {0} is not open")]
    BallotNotOpen(String),

    #[error("ballot not found: {0}")]
    BallotNotFound(String),

    #[error("unknown ballot purpose: {0}")]
    UnknownPurpose(String),

    #[error("position {position:?} is not valid on a {purpose} ballot")]
    InvalidPosition { purpose: String, position: String },

    #[error("inconsistent action-holder state: {0}")]
    InconsistentActionHolderState(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

impl TrackerError {
    /// Validation-class errors a caller can correct and retry.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            TrackerError::InconsistentActionHolderState(_) | TrackerError::Storage(_)
        )
    }

    /// The message to show an end user.
    ///
    /// Internal errors are reported generically; their detail belongs in logs.
    pub fn public_message(&self) -> String {
        if self.is_user_error() {
            self.to_string()
        } else {
            "internal error: the operation was not applied".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_lists_alternatives() {
        let err = TrackerError::InvalidTransition {
            document: "draft-foo".into(),
            axis: Axis::Iesg,
            current: Some("lc".into()),
            requested: "pub".into(),
            allowed: vec!["writeupw".into(), "goaheadw".into(), "dead".into()],
        };
        assert!(err.is_user_error());
        assert_eq!(
            err.public_message(),
            "draft-foo: cannot move draft-iesg from lc to pub; allowed: writeupw, goaheadw, dead"
        );
    }

    #[test]
    fn internal_errors_are_generic() {
        let err = TrackerError::InconsistentActionHolderState("secret detail".into());
        assert!(!err.is_user_error());
        assert!(!err.public_message().contains("secret"));
    }
}
