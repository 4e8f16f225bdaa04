//! Local persistence: documents, their event logs, and ballots.
//!
//! Everything lives in one `SQLite` file:
//!
//! ```text
//! documents        # Snapshot row per document
//! document_states  # One row per (document, axis): at most one current state
//! document_tags    # Active tags
//! action_holders   # Current action holders, in order
//! doc_events       # Append-only event log, numbered per document
//! ballots          # Ballot lifecycle rows
//! ```
//!
//! Writes happen inside [`Storage::with_document`], which serializes work on
//! one document and commits its events and snapshot together.

mod ballots;
mod documents;
mod events;
mod schema;

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use jiff::Timestamp;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::model::{Axis, Ballot, BallotId, DocEvent, Document, EventType, NewEvent};

pub use documents::DocumentCursor;
pub use events::EventCursor;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },
}

pub type Result<T> = core::result::Result<T, StorageError>;

fn to_nanos(ts: Timestamp) -> Result<i64> {
    i64::try_from(ts.as_nanosecond())
        .map_err(|_| StorageError::Corrupt(format!("timestamp out of range: {ts}")))
}

fn from_nanos(nanos: i64) -> Result<Timestamp> {
    Timestamp::from_nanosecond(i128::from(nanos))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp {nanos}: {e}")))
}

fn opt_to_nanos(ts: Option<Timestamp>) -> Result<Option<i64>> {
    ts.map(to_nanos).transpose()
}

fn opt_from_nanos(nanos: Option<i64>) -> Result<Option<Timestamp>> {
    nanos.map(from_nanos).transpose()
}

/// Per-document mutexes held for the length of a unit of work.
#[derive(Debug, Default)]
struct DocumentLocks(Mutex<HashMap<String, Arc<Mutex<()>>>>);

impl DocumentLocks {
    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Drops the entry once no other unit holds or awaits it.
    fn release(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
    }
}

/// `SQLite`-backed store for documents, events, and ballots.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    locks: DocumentLocks,
}

impl Storage {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Self {
            path,
            locks: DocumentLocks::default(),
        };
        let conn = storage.connect()?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        schema::migrate(&conn)?;
        Ok(storage)
    }

    /// Returns the default database path: `~/.doctrack/doctrack.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".doctrack").join("doctrack.sqlite"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    /// Runs `f` as one atomic unit of work on the named document.
    ///
    /// Holds the document's lock and an immediate write transaction for the
    /// whole call. On `Ok` the appended events and the updated snapshot are
    /// committed together; on `Err` nothing is.
    pub fn with_document<T, E>(
        &self,
        name: &str,
        f: impl FnOnce(&mut DocumentTx<'_>) -> core::result::Result<T, E>,
    ) -> core::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let lock = self.locks.lock_for(name);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.run_unit(name, f)
        };
        self.locks.release(name, lock);
        result
    }

    fn run_unit<T, E>(
        &self,
        name: &str,
        f: impl FnOnce(&mut DocumentTx<'_>) -> core::result::Result<T, E>,
    ) -> core::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let document = documents::load(&tx, name)?;
        let mut unit = DocumentTx {
            tx,
            name: name.to_string(),
            document,
            created: false,
            events: Vec::new(),
        };

        let value = f(&mut unit)?;
        unit.commit()?;
        Ok(value)
    }

    // ── Reads ──

    pub fn load_document(&self, name: &str) -> Result<Option<Document>> {
        let conn = self.connect()?;
        documents::load(&conn, name)
    }

    /// Lazily pages through all documents currently in `state` on `axis`, by name.
    pub fn documents_in_state(&self, axis: Axis, state: &str) -> DocumentCursor<'_> {
        DocumentCursor::new(self, axis, state)
    }

    /// Lazily pages through a document's events in append order.
    ///
    /// Each call starts from the beginning, so the sequence is restartable.
    pub fn events_for(&self, name: &str) -> EventCursor<'_> {
        EventCursor::new(self, name, None)
    }

    /// Like [`Storage::events_for`], restricted to one event type.
    pub fn events_of_type(&self, name: &str, event_type: EventType) -> EventCursor<'_> {
        EventCursor::new(self, name, Some(event_type))
    }

    /// The most recent event, optionally of one type.
    pub fn latest(&self, name: &str, event_type: Option<EventType>) -> Result<Option<DocEvent>> {
        let conn = self.connect()?;
        events::latest(&conn, name, event_type)
    }

    /// Events recorded within `[from, to)`, across all documents, in append order.
    pub fn events_between(&self, from: Timestamp, to: Timestamp) -> Result<Vec<DocEvent>> {
        let conn = self.connect()?;
        events::between(&conn, from, to)
    }

    pub fn load_ballot(&self, id: BallotId) -> Result<Option<Ballot>> {
        let conn = self.connect()?;
        ballots::load(&conn, id)
    }

    pub fn ballots_for(&self, name: &str) -> Result<Vec<Ballot>> {
        let conn = self.connect()?;
        ballots::for_document(&conn, name)
    }
}

/// One document's unit of work inside a write transaction.
pub struct DocumentTx<'c> {
    tx: rusqlite::Transaction<'c>,
    name: String,
    document: Option<Document>,
    created: bool,
    events: Vec<DocEvent>,
}

impl DocumentTx<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The document as of the start of the unit plus any events appended since.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Events appended in this unit so far.
    pub fn appended(&self) -> &[DocEvent] {
        &self.events
    }

    /// Registers a new document. Its lifecycle fields start empty and are
    /// filled by the events appended after it.
    pub fn insert(&mut self, document: Document) -> Result<()> {
        if self.document.is_some() || document.name != self.name {
            return Err(StorageError::Corrupt(format!(
                "cannot insert {} in a unit for {}",
                document.name, self.name
            )));
        }
        documents::insert(&self.tx, &document)?;
        self.document = Some(document);
        self.created = true;
        Ok(())
    }

    /// Appends an event and folds it into the snapshot.
    pub fn append(&mut self, event: NewEvent, at: Timestamp) -> Result<DocEvent> {
        let document = self.document.as_mut().ok_or_else(|| {
            StorageError::Corrupt(format!("append to missing document {}", self.name))
        })?;
        let committed = events::insert(&self.tx, document, event, at)?;
        document.apply(&committed);
        debug!(
            document = %committed.document,
            seq = committed.seq,
            kind = %committed.kind.event_type(),
            "appended event"
        );
        self.events.push(committed.clone());
        Ok(committed)
    }

    /// The most recent committed or appended event, optionally of one type.
    pub fn latest(&self, event_type: Option<EventType>) -> Result<Option<DocEvent>> {
        events::latest(&self.tx, &self.name, event_type)
    }

    /// All events of one type, in append order.
    pub fn events_of_type(&self, event_type: EventType) -> Result<Vec<DocEvent>> {
        events::all_of_type(&self.tx, &self.name, event_type)
    }

    pub fn ballot(&self, id: BallotId) -> Result<Option<Ballot>> {
        ballots::load(&self.tx, id).map(|b| b.filter(|b| b.document == self.name))
    }

    pub fn open_ballot_for(&self, purpose: &str) -> Result<Option<Ballot>> {
        ballots::open_for(&self.tx, &self.name, purpose)
    }

    pub fn open_ballots(&self) -> Result<Vec<Ballot>> {
        ballots::open_for_document(&self.tx, &self.name)
    }

    pub fn insert_ballot(&mut self, ballot: &Ballot) -> Result<()> {
        ballots::insert(&self.tx, ballot)
    }

    pub fn mark_ballot_closed(&mut self, id: BallotId, at: Timestamp) -> Result<()> {
        ballots::close(&self.tx, id, at)
    }

    fn commit(self) -> Result<()> {
        if let Some(document) = &self.document
            && (self.created || !self.events.is_empty())
        {
            documents::update(&self.tx, document)?;
            documents::write_snapshot(&self.tx, document)?;
        }
        self.tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::{Actor, EventKind, Snapshot};
    use crate::testing;

    fn test_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path().join("db").join("doctrack.sqlite")).unwrap();
        (dir, storage)
    }

    fn seed(storage: &Storage, name: &str) {
        storage
            .with_document(name, |unit| -> Result<()> {
                let mut doc = testing::document(name);
                doc.snapshot = Snapshot::default();
                doc.last_seq = 0;
                unit.insert(doc)?;
                unit.append(
                    NewEvent::new(
                        &Actor::System,
                        EventKind::NewRevision {
                            revision: "00".into(),
                            expires: None,
                        },
                        "New version available",
                    ),
                    testing::t0(),
                )?;
                unit.append(
                    NewEvent::new(
                        &Actor::System,
                        EventKind::ChangedState {
                            axis: Axis::Draft,
                            old: None,
                            new: "active".into(),
                            added_tags: Default::default(),
                            removed_tags: Default::default(),
                        },
                        "State changed to Active",
                    ),
                    testing::t0(),
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn insert_and_load_document() {
        let (_dir, storage) = test_storage();
        seed(&storage, "draft-ietf-quic-foo");

        let doc = storage.load_document("draft-ietf-quic-foo").unwrap().unwrap();
        assert_eq!(doc.rev(), "00");
        assert_eq!(doc.state(Axis::Draft), Some("active"));
        assert_eq!(doc.last_seq, 2);
        assert_eq!(doc.authors, testing::document("x").authors);
    }

    #[test]
    fn missing_document_is_none() {
        let (_dir, storage) = test_storage();
        assert!(storage.load_document("draft-nope").unwrap().is_none());
    }

    #[test]
    fn failed_unit_commits_nothing() {
        let (_dir, storage) = test_storage();
        seed(&storage, "draft-ietf-quic-foo");

        let result = storage.with_document("draft-ietf-quic-foo", |unit| -> Result<()> {
            unit.append(
                NewEvent::new(&Actor::System, EventKind::AddedComment, "doomed"),
                testing::t0(),
            )?;
            Err(StorageError::Corrupt("abort".into()))
        });
        assert!(result.is_err());

        let events: Vec<_> = storage
            .events_for("draft-ietf-quic-foo")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        let doc = storage.load_document("draft-ietf-quic-foo").unwrap().unwrap();
        assert_eq!(doc.last_seq, 2);
    }

    #[test]
    fn append_without_document_fails() {
        let (_dir, storage) = test_storage();
        let result = storage.with_document("draft-ghost", |unit| {
            unit.append(
                NewEvent::new(&Actor::System, EventKind::AddedComment, "hello"),
                testing::t0(),
            )
        });
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn locks_are_dropped_after_each_unit() {
        let (_dir, storage) = test_storage();
        seed(&storage, "draft-ietf-quic-foo");
        let _ = storage.with_document("draft-nope", |unit| -> Result<bool> {
            Ok(unit.document().is_some())
        });
        let _ = storage.with_document("draft-ietf-quic-foo", |_| -> Result<()> {
            Err(StorageError::Corrupt("abort".into()))
        });

        let locks = storage.locks.0.lock().unwrap();
        assert!(locks.is_empty());
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doctrack.sqlite");
        {
            let storage = Storage::open(&path).unwrap();
            seed(&storage, "draft-ietf-quic-foo");
        }
        let storage = Storage::open(&path).unwrap();
        assert!(storage.load_document("draft-ietf-quic-foo").unwrap().is_some());
    }

    #[test]
    fn concurrent_units_on_one_document_do_not_interleave() {
        let (_dir, storage) = test_storage();
        seed(&storage, "draft-ietf-quic-foo");

        std::thread::scope(|s| {
            for i in 0..4 {
                let storage = &storage;
                s.spawn(move || {
                    for j in 0..5 {
                        storage
                            .with_document("draft-ietf-quic-foo", |unit| {
                                unit.append(
                                    NewEvent::new(
                                        &Actor::System,
                                        EventKind::AddedComment,
                                        format!("comment {i}-{j}"),
                                    ),
                                    testing::t0(),
                                )
                            })
                            .unwrap();
                    }
                });
            }
        });

        let events: Vec<_> = storage
            .events_for("draft-ietf-quic-foo")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 22);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=22).collect::<Vec<_>>());
    }
}
