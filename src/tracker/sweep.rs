//! Scheduled sweeps: draft expiry, expiry warnings, and last-call expiry.
//!
//! Every decision is re-checked under the document lock, so re-running a
//! sweep over the same window is a no-op for documents already handled.

use jiff::Timestamp;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    error::TrackerError,
    expiry,
    model::{Actor, Axis, Document, EventKind, EventType, NewEvent},
    notify,
    storage::DocumentTx,
};

use super::{TransitionRequest, Tracker, require};

/// What one sweep did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired: Vec<String>,
    pub warned: Vec<String>,
    pub last_calls: Vec<String>,
    pub failed: Vec<SweepFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub document: String,
    pub error: String,
}

impl SweepReport {
    fn fail(&mut self, document: &str, e: &TrackerError) {
        error!(document, error = %e, "sweep skipped document");
        self.failed.push(SweepFailure {
            document: document.to_string(),
            error: e.to_string(),
        });
    }
}

impl Tracker {
    /// Whether the named document is past its expiry as of `as_of`.
    ///
    /// Agrees with [`Tracker::find_expirable`] for the same input.
    pub fn is_expirable(&self, name: &str, as_of: Timestamp) -> Result<bool, TrackerError> {
        Ok(expiry::is_due(&self.document(name)?, as_of))
    }

    /// Lazily yields documents past their expiry as of `as_of`, by name.
    pub fn find_expirable(
        &self,
        as_of: Timestamp,
    ) -> impl Iterator<Item = Result<Document, TrackerError>> + '_ {
        self.storage
            .documents_in_state(Axis::Draft, "active")
            .filter(move |doc| match doc {
                Ok(d) => expiry::is_due(d, as_of),
                Err(_) => true,
            })
            .map(|doc| doc.map_err(TrackerError::from))
    }

    /// Lazily yields documents whose last call ended by `as_of`.
    pub fn find_expired_last_calls(
        &self,
        as_of: Timestamp,
    ) -> impl Iterator<Item = Result<Document, TrackerError>> + '_ {
        self.storage
            .documents_in_state(Axis::Iesg, "lc")
            .map(|doc| doc.map_err(TrackerError::from))
            .filter_map(move |doc| match doc {
                Ok(d) => match self.last_call_over(&d.name, as_of) {
                    Ok(true) => Some(Ok(d)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            })
    }

    /// Expires due drafts and warns authors of drafts about to expire.
    ///
    /// Acts as the system. A failure on one document is recorded and the
    /// sweep moves on.
    pub fn sweep_expirations(&self, as_of: Timestamp) -> Result<SweepReport, TrackerError> {
        let mut report = SweepReport::default();
        let candidates = self
            .storage
            .documents_in_state(Axis::Draft, "active")
            .collect::<Result<Vec<_>, _>>()?;

        for candidate in candidates {
            let name = candidate.name.as_str();
            if expiry::is_due(&candidate, as_of) {
                match self.expire(name, as_of) {
                    Ok(true) => report.expired.push(name.to_string()),
                    Ok(false) => debug!(document = name, "no longer due; skipped"),
                    Err(e) => report.fail(name, &e),
                }
            } else if expiry::needs_warning(&candidate, &self.expiry, as_of) {
                match self.warn_expiry(name, as_of) {
                    Ok(true) => report.warned.push(name.to_string()),
                    Ok(false) => debug!(document = name, "expiry warning already sent"),
                    Err(e) => report.fail(name, &e),
                }
            }
        }

        info!(
            expired = report.expired.len(),
            warned = report.warned.len(),
            failed = report.failed.len(),
            "expiry sweep finished"
        );
        Ok(report)
    }

    /// Moves documents whose last call has ended back to waiting for writeup.
    pub fn sweep_last_calls(&self, as_of: Timestamp) -> Result<SweepReport, TrackerError> {
        let mut report = SweepReport::default();
        let candidates = self
            .storage
            .documents_in_state(Axis::Iesg, "lc")
            .collect::<Result<Vec<_>, _>>()?;

        for candidate in candidates {
            let name = candidate.name.as_str();
            match self.end_last_call(name, as_of) {
                Ok(true) => report.last_calls.push(name.to_string()),
                Ok(false) => {}
                Err(e) => report.fail(name, &e),
            }
        }

        info!(
            ended = report.last_calls.len(),
            failed = report.failed.len(),
            "last-call sweep finished"
        );
        Ok(report)
    }

    /// Expires one document if it is still due. Returns whether it did.
    fn expire(&self, name: &str, as_of: Timestamp) -> Result<bool, TrackerError> {
        let at = self.clock.now();
        let expired = self.storage.with_document(name, |unit| {
            let document = require(unit)?;
            if !expiry::is_due(&document, as_of) {
                return Ok(None);
            }
            let request = TransitionRequest::new(name, Axis::Draft, "expired", Actor::System);
            let change = self.change_state(unit, &request, at)?;
            unit.append(
                NewEvent::new(&Actor::System, EventKind::Expired, "Document has expired"),
                at,
            )?;
            Ok::<_, TrackerError>(Some((require(unit)?, change)))
        })?;

        let Some((document, change)) = expired else {
            return Ok(false);
        };
        info!(document = name, rev = document.rev(), "draft expired");
        if let Some(change) = &change {
            self.announce(&document, change, &Actor::System);
        }
        if let Err(e) = self.archive.archive(name, document.rev()) {
            warn!(document = name, rev = document.rev(), error = %e, "archiving failed; expiry stands");
        }
        Ok(true)
    }

    /// Records and sends an expiry warning unless one went out for the same
    /// expiry already.
    fn warn_expiry(&self, name: &str, as_of: Timestamp) -> Result<bool, TrackerError> {
        let at = self.clock.now();
        let warned = self.storage.with_document(name, |unit| {
            let document = require(unit)?;
            if !expiry::needs_warning(&document, &self.expiry, as_of) {
                return Ok(None);
            }
            let Some(expires) = document.snapshot.expires else {
                return Ok(None);
            };
            if already_warned(unit, expires)? {
                return Ok(None);
            }
            unit.append(
                NewEvent::new(
                    &Actor::System,
                    EventKind::ExpiryWarningSent { expires },
                    format!("Expiration warning sent, expires {}", expires.strftime("%Y-%m-%d")),
                ),
                at,
            )?;
            Ok::<_, TrackerError>(Some((document, expires)))
        })?;

        let Some((document, expires)) = warned else {
            return Ok(false);
        };
        self.deliver(vec![notify::expiry_warning(&document, expires)]);
        Ok(true)
    }

    /// Ends one last call if it is still running and over. Returns whether it did.
    fn end_last_call(&self, name: &str, as_of: Timestamp) -> Result<bool, TrackerError> {
        let at = self.clock.now();
        let ended = self.storage.with_document(name, |unit| {
            let document = require(unit)?;
            if document.state(Axis::Iesg) != Some("lc") || !last_call_over_in(unit, as_of)? {
                return Ok(None);
            }
            let request = TransitionRequest::new(name, Axis::Iesg, "writeupw", Actor::System)
                .with_comment("Last call period has ended");
            let change = self.change_state(unit, &request, at)?;
            Ok::<_, TrackerError>(Some((require(unit)?, change)))
        })?;

        let Some((document, change)) = ended else {
            return Ok(false);
        };
        info!(document = name, "last call ended");
        if let Some(change) = &change {
            self.announce(&document, change, &Actor::System);
        }
        Ok(true)
    }

    fn last_call_over(&self, name: &str, as_of: Timestamp) -> Result<bool, TrackerError> {
        let latest = self.storage.latest(name, Some(EventType::LastCallIssued))?;
        Ok(last_call_ends(latest.as_ref().map(|e| &e.kind)).is_some_and(|e| e <= as_of))
    }
}

fn last_call_over_in(unit: &DocumentTx<'_>, as_of: Timestamp) -> Result<bool, TrackerError> {
    let latest = unit.latest(Some(EventType::LastCallIssued))?;
    Ok(last_call_ends(latest.as_ref().map(|e| &e.kind)).is_some_and(|e| e <= as_of))
}

fn last_call_ends(kind: Option<&EventKind>) -> Option<Timestamp> {
    match kind {
        Some(EventKind::LastCallIssued { expires }) => Some(*expires),
        _ => None,
    }
}

fn already_warned(unit: &DocumentTx<'_>, expires: Timestamp) -> Result<bool, TrackerError> {
    Ok(unit
        .events_of_type(EventType::ExpiryWarningSent)?
        .iter()
        .any(|e| e.kind == EventKind::ExpiryWarningSent { expires }))
}
