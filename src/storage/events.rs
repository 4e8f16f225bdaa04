//! Event log storage: append, point and range queries, and paged reads.
//!
//! Events are numbered per document in append order. That number is the
//! total order of a document's history: a same-instant batch reads back
//! exactly as it was written.

use std::collections::VecDeque;

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::{Actor, DocEvent, Document, EventKind, EventType, NewEvent};

use super::{Result, Storage, StorageError, documents::seq_to_i64, from_nanos, to_nanos};

const PAGE_SIZE: i64 = 200;

const COLUMNS: &str = "id, document, seq, rev, actor, time, description, payload";

/// Inserts the next event for `document` and returns it as committed.
///
/// Does not fold the event into the document; the caller does.
pub(super) fn insert(
    conn: &Connection,
    document: &Document,
    event: NewEvent,
    at: Timestamp,
) -> Result<DocEvent> {
    let seq = document.last_seq + 1;
    let event_type = event.kind.event_type();
    // A new revision is recorded under the revision it introduces.
    let rev = match &event.kind {
        EventKind::NewRevision { revision, .. } => revision.clone(),
        _ => document.snapshot.rev.clone(),
    };

    conn.execute(
        "INSERT INTO doc_events (document, seq, rev, kind, actor, time, description, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &document.name,
            seq_to_i64(seq)?,
            &rev,
            event_type.slug(),
            serde_json::to_string(&event.actor)?,
            to_nanos(at)?,
            &event.description,
            serde_json::to_string(&event.kind)?,
        ],
    )?;

    Ok(DocEvent {
        id: conn.last_insert_rowid(),
        document: document.name.clone(),
        seq,
        rev,
        actor: event.actor,
        time: at,
        description: event.description,
        kind: event.kind,
    })
}

type RawEvent = (i64, String, i64, String, String, i64, String, String);

fn raw(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode((id, document, seq, rev, actor, time, description, payload): RawEvent) -> Result<DocEvent> {
    let seq = u64::try_from(seq)
        .map_err(|_| StorageError::Corrupt(format!("{document}: negative event seq")))?;
    let actor: Actor = serde_json::from_str(&actor)?;
    let kind: EventKind = serde_json::from_str(&payload)?;
    Ok(DocEvent {
        id,
        document,
        seq,
        rev,
        actor,
        time: from_nanos(time)?,
        description,
        kind,
    })
}

fn collect(rows: impl Iterator<Item = rusqlite::Result<RawEvent>>) -> Result<Vec<DocEvent>> {
    rows.map(|row| decode(row?)).collect()
}

pub(super) fn latest(
    conn: &Connection,
    name: &str,
    event_type: Option<EventType>,
) -> Result<Option<DocEvent>> {
    let row = match event_type {
        Some(t) => conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM doc_events
                     WHERE document = ?1 AND kind = ?2
                     ORDER BY seq DESC LIMIT 1"
                ),
                params![name, t.slug()],
                raw,
            )
            .optional()?,
        None => conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM doc_events
                     WHERE document = ?1
                     ORDER BY seq DESC LIMIT 1"
                ),
                [name],
                raw,
            )
            .optional()?,
    };
    row.map(decode).transpose()
}

pub(super) fn all_of_type(
    conn: &Connection,
    name: &str,
    event_type: EventType,
) -> Result<Vec<DocEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM doc_events
         WHERE document = ?1 AND kind = ?2
         ORDER BY seq"
    ))?;
    let rows = stmt.query_map(params![name, event_type.slug()], raw)?;
    collect(rows)
}

pub(super) fn between(conn: &Connection, from: Timestamp, to: Timestamp) -> Result<Vec<DocEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM doc_events
         WHERE time >= ?1 AND time < ?2
         ORDER BY time, id"
    ))?;
    let rows = stmt.query_map(params![to_nanos(from)?, to_nanos(to)?], raw)?;
    collect(rows)
}

/// Lazily pages through one document's events in append order.
pub struct EventCursor<'s> {
    storage: &'s Storage,
    document: String,
    event_type: Option<EventType>,
    after_seq: i64,
    buffer: VecDeque<DocEvent>,
    exhausted: bool,
}

impl<'s> EventCursor<'s> {
    pub(super) fn new(storage: &'s Storage, document: &str, event_type: Option<EventType>) -> Self {
        Self {
            storage,
            document: document.to_string(),
            event_type,
            after_seq: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let conn = self.storage.connect()?;
        let kind_filter = if self.event_type.is_some() {
            "AND kind = ?4"
        } else {
            "AND ?4 IS NULL"
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM doc_events
             WHERE document = ?1 AND seq > ?2 {kind_filter}
             ORDER BY seq
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![
                &self.document,
                self.after_seq,
                PAGE_SIZE,
                self.event_type.map(EventType::slug),
            ],
            raw,
        )?;
        let page = collect(rows)?;

        if page.len() < usize::try_from(PAGE_SIZE).unwrap_or(usize::MAX) {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.after_seq = seq_to_i64(last.seq)?;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for EventCursor<'_> {
    type Item = Result<DocEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.buffer.pop_front() {
            return Some(Ok(event));
        }
        if self.exhausted {
            return None;
        }
        if let Err(e) = self.fill() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
