//! Document snapshot rows: load, insert, update, and paged listing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{ActionHolder, Axis, Document, Person, Snapshot, Stream};

use super::{Result, Storage, StorageError, from_nanos, opt_from_nanos, opt_to_nanos, to_nanos};

const PAGE_SIZE: i64 = 100;

/// Loads a document and its current states, tags, and action holders.
pub(super) fn load(conn: &Connection, name: &str) -> Result<Option<Document>> {
    let row = conn
        .query_row(
            "SELECT name, rev, stream, grp, ad, authors, expires, time, last_seq
             FROM documents WHERE name = ?1",
            [name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((name, rev, stream, group, ad, authors, expires, time, last_seq)) = row else {
        return Ok(None);
    };

    let stream = stream
        .parse::<Stream>()
        .map_err(|e| StorageError::Corrupt(format!("{name}: {e}")))?;
    let ad: Option<Person> = ad.as_deref().map(serde_json::from_str).transpose()?;
    let authors: Vec<Person> = serde_json::from_str(&authors)?;
    let last_seq = u64::try_from(last_seq)
        .map_err(|_| StorageError::Corrupt(format!("{name}: negative last_seq")))?;

    let snapshot = Snapshot {
        rev,
        expires: opt_from_nanos(expires)?,
        states: load_states(conn, &name)?,
        tags: load_tags(conn, &name)?,
        action_holders: load_holders(conn, &name)?,
    };

    Ok(Some(Document {
        name,
        stream,
        group,
        ad,
        authors,
        snapshot,
        time: from_nanos(time)?,
        last_seq,
    }))
}

fn load_states(conn: &Connection, name: &str) -> Result<BTreeMap<Axis, String>> {
    let mut stmt = conn.prepare("SELECT axis, state FROM document_states WHERE document = ?1")?;
    let rows = stmt.query_map([name], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut states = BTreeMap::new();
    for row in rows {
        let (axis, state) = row?;
        let axis = axis
            .parse::<Axis>()
            .map_err(|e| StorageError::Corrupt(format!("{name}: {e}")))?;
        states.insert(axis, state);
    }
    Ok(states)
}

fn load_tags(conn: &Connection, name: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM document_tags WHERE document = ?1")?;
    let tags = stmt
        .query_map([name], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(tags)
}

fn load_holders(conn: &Connection, name: &str) -> Result<Vec<ActionHolder>> {
    let mut stmt = conn.prepare(
        "SELECT name, email, since FROM action_holders
         WHERE document = ?1 ORDER BY ordinal",
    )?;
    let rows = stmt.query_map([name], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    let mut holders = Vec::new();
    for row in rows {
        let (person_name, email, since) = row?;
        holders.push(ActionHolder {
            person: Person::new(person_name, email),
            since: from_nanos(since)?,
        });
    }
    Ok(holders)
}

pub(super) fn insert(conn: &Connection, document: &Document) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (name, rev, stream, grp, ad, authors, expires, time, last_seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &document.name,
            &document.snapshot.rev,
            document.stream.slug(),
            &document.group,
            document.ad.as_ref().map(serde_json::to_string).transpose()?,
            serde_json::to_string(&document.authors)?,
            opt_to_nanos(document.snapshot.expires)?,
            to_nanos(document.time)?,
            seq_to_i64(document.last_seq)?,
        ],
    )?;
    Ok(())
}

pub(super) fn update(conn: &Connection, document: &Document) -> Result<()> {
    let rows = conn.execute(
        "UPDATE documents
         SET rev = ?1, expires = ?2, time = ?3, last_seq = ?4
         WHERE name = ?5",
        params![
            &document.snapshot.rev,
            opt_to_nanos(document.snapshot.expires)?,
            to_nanos(document.time)?,
            seq_to_i64(document.last_seq)?,
            &document.name,
        ],
    )?;
    if rows == 0 {
        return Err(StorageError::Corrupt(format!(
            "update of missing document {}",
            document.name
        )));
    }
    Ok(())
}

/// Rewrites the state, tag, and action-holder rows from the snapshot.
pub(super) fn write_snapshot(conn: &Connection, document: &Document) -> Result<()> {
    let name = &document.name;
    conn.execute("DELETE FROM document_states WHERE document = ?1", [name])?;
    conn.execute("DELETE FROM document_tags WHERE document = ?1", [name])?;
    conn.execute("DELETE FROM action_holders WHERE document = ?1", [name])?;

    for (axis, state) in &document.snapshot.states {
        conn.execute(
            "INSERT INTO document_states (document, axis, state) VALUES (?1, ?2, ?3)",
            params![name, axis.slug(), state],
        )?;
    }
    for tag in &document.snapshot.tags {
        conn.execute(
            "INSERT INTO document_tags (document, tag) VALUES (?1, ?2)",
            params![name, tag],
        )?;
    }
    for (ordinal, holder) in document.snapshot.action_holders.iter().enumerate() {
        conn.execute(
            "INSERT INTO action_holders (document, ordinal, email, name, since)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                i64::try_from(ordinal).unwrap_or(i64::MAX),
                &holder.person.email,
                &holder.person.name,
                to_nanos(holder.since)?,
            ],
        )?;
    }
    Ok(())
}

pub(super) fn seq_to_i64(seq: u64) -> Result<i64> {
    i64::try_from(seq).map_err(|_| StorageError::Corrupt(format!("sequence out of range: {seq}")))
}

/// Lazily pages through documents in one state on one axis, ordered by name.
///
/// Each page is read with a fresh connection, so no lock is held between
/// items and callers may write to documents while iterating.
pub struct DocumentCursor<'s> {
    storage: &'s Storage,
    axis: Axis,
    state: String,
    after: String,
    buffer: VecDeque<String>,
    exhausted: bool,
}

impl<'s> DocumentCursor<'s> {
    pub(super) fn new(storage: &'s Storage, axis: Axis, state: &str) -> Self {
        Self {
            storage,
            axis,
            state: state.to_string(),
            after: String::new(),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let conn = self.storage.connect()?;
        let mut stmt = conn.prepare(
            "SELECT d.name FROM documents d
             JOIN document_states s ON s.document = d.name
             WHERE s.axis = ?1 AND s.state = ?2 AND d.name > ?3
             ORDER BY d.name
             LIMIT ?4",
        )?;
        let names: Vec<String> = stmt
            .query_map(
                params![self.axis.slug(), &self.state, &self.after, PAGE_SIZE],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<_>>()?;
        if names.len() < usize::try_from(PAGE_SIZE).unwrap_or(usize::MAX) {
            self.exhausted = true;
        }
        if let Some(last) = names.last() {
            self.after.clone_from(last);
        }
        self.buffer.extend(names);
        Ok(())
    }
}

impl Iterator for DocumentCursor<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(name) = self.buffer.pop_front() {
                match self.storage.load_document(&name) {
                    Ok(Some(doc)) => return Some(Ok(doc)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.exhausted = true;
                        self.buffer.clear();
                        return Some(Err(e));
                    }
                }
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
