//! The tracker: every lifecycle operation, over one store and one catalog.
//!
//! Each write runs inside [`Storage::with_document`], so a document's
//! read-validate-append sequence never interleaves with another write to the
//! same document. Notifications and archiving happen after commit and never
//! undo it.
//!
//! Operations are grouped by concern:
//!
//! ```text
//! transition.rs  # State changes, tags, action holders
//! documents.rs   # Creation, revisions, comments, holder overrides, replay
//! ballots.rs     # Open, position, close
//! sweep.rs       # Draft expiry and last-call expiry
//! ```

mod ballots;
mod documents;
mod sweep;
mod transition;

use tracing::warn;

use crate::{
    archive::{Archive, NoArchive},
    ballot::BallotPolicies,
    clock::{Clock, SystemClock},
    error::TrackerError,
    expiry::ExpiryPolicy,
    model::{Actor, Document},
    notify::{self, LogNotifier, Notification, Notifier, StateChanged},
    registry::Registry,
    storage::{DocumentTx, EventCursor, Storage},
};

pub use ballots::ClosedBallot;
pub use documents::NewDocument;
pub use sweep::{SweepFailure, SweepReport};
pub use transition::{TransitionRequest, TransitionResult};

/// The lifecycle engine and its collaborators.
#[derive(Debug)]
pub struct Tracker {
    storage: Storage,
    registry: Registry,
    policies: BallotPolicies,
    expiry: ExpiryPolicy,
    notifier: Box<dyn Notifier>,
    archive: Box<dyn Archive>,
    clock: Box<dyn Clock>,
}

impl Tracker {
    /// A tracker with the built-in catalog and policies, logging notifications
    /// and archiving nothing.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            registry: Registry::builtin(),
            policies: BallotPolicies::builtin(),
            expiry: ExpiryPolicy::default(),
            notifier: Box::new(LogNotifier),
            archive: Box::new(NoArchive),
            clock: Box::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_policies(mut self, policies: BallotPolicies) -> Self {
        self.policies = policies;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    #[must_use]
    pub fn with_archive(mut self, archive: impl Archive + 'static) -> Self {
        self.archive = Box::new(archive);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn policies(&self) -> &BallotPolicies {
        &self.policies
    }

    pub fn document(&self, name: &str) -> Result<Document, TrackerError> {
        self.storage
            .load_document(name)?
            .ok_or_else(|| TrackerError::DocumentNotFound(name.to_string()))
    }

    /// A document's full history, oldest first.
    pub fn history(&self, name: &str) -> EventCursor<'_> {
        self.storage.events_for(name)
    }

    fn deliver(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            if let Err(e) = self.notifier.send(&notification) {
                warn!(
                    template = %notification.template,
                    to = %notification.to.join(", "),
                    error = %e,
                    "notification failed; change stands"
                );
            }
        }
    }

    fn announce(&self, document: &Document, change: &StateChanged, actor: &Actor) {
        if change.moved() {
            self.deliver(notify::for_state_change(
                &self.registry,
                document,
                change,
                actor,
            ));
        }
    }
}

/// The document as it stands in a unit, or `DocumentNotFound`.
fn require(unit: &DocumentTx<'_>) -> Result<Document, TrackerError> {
    unit.document()
        .cloned()
        .ok_or_else(|| TrackerError::DocumentNotFound(unit.name().to_string()))
}

/// The unit's document and the events it appended.
fn outcome(unit: &DocumentTx<'_>) -> Result<TransitionResult, TrackerError> {
    Ok(TransitionResult {
        document: require(unit)?,
        events: unit.appended().to_vec(),
    })
}
