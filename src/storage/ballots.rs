//! Ballot lifecycle rows. Positions live in the event log.

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::{Actor, Ballot, BallotId};

use super::{Result, StorageError, from_nanos, opt_from_nanos, opt_to_nanos, to_nanos};

const COLUMNS: &str = "id, document, purpose, opened_by, opened_at, due, closed_at";

type RawBallot = (String, String, String, String, i64, Option<i64>, Option<i64>);

fn raw(row: &Row<'_>) -> rusqlite::Result<RawBallot> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode((id, document, purpose, opened_by, opened_at, due, closed_at): RawBallot) -> Result<Ballot> {
    let id = id
        .parse::<BallotId>()
        .map_err(|e| StorageError::Corrupt(format!("ballot id {id:?}: {e}")))?;
    let opened_by: Actor = serde_json::from_str(&opened_by)?;
    Ok(Ballot {
        id,
        document,
        purpose,
        opened_by,
        opened_at: from_nanos(opened_at)?,
        due: opt_from_nanos(due)?,
        closed_at: opt_from_nanos(closed_at)?,
    })
}

pub(super) fn load(conn: &Connection, id: BallotId) -> Result<Option<Ballot>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ballots WHERE id = ?1"),
        [id.to_string()],
        raw,
    )
    .optional()?
    .map(decode)
    .transpose()
}

/// All ballots on a document, oldest first.
pub(super) fn for_document(conn: &Connection, name: &str) -> Result<Vec<Ballot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ballots WHERE document = ?1 ORDER BY opened_at, rowid"
    ))?;
    let rows = stmt.query_map([name], raw)?;
    rows.map(|row| decode(row?)).collect()
}

pub(super) fn open_for(conn: &Connection, name: &str, purpose: &str) -> Result<Option<Ballot>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM ballots
             WHERE document = ?1 AND purpose = ?2 AND closed_at IS NULL"
        ),
        [name, purpose],
        raw,
    )
    .optional()?
    .map(decode)
    .transpose()
}

/// Ballots on a document that have not closed, oldest first.
pub(super) fn open_for_document(conn: &Connection, name: &str) -> Result<Vec<Ballot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ballots
         WHERE document = ?1 AND closed_at IS NULL
         ORDER BY opened_at, rowid"
    ))?;
    let rows = stmt.query_map([name], raw)?;
    rows.map(|row| decode(row?)).collect()
}

pub(super) fn insert(conn: &Connection, ballot: &Ballot) -> Result<()> {
    conn.execute(
        "INSERT INTO ballots (id, document, purpose, opened_by, opened_at, due, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            ballot.id.to_string(),
            &ballot.document,
            &ballot.purpose,
            serde_json::to_string(&ballot.opened_by)?,
            to_nanos(ballot.opened_at)?,
            opt_to_nanos(ballot.due)?,
            opt_to_nanos(ballot.closed_at)?,
        ],
    )?;
    Ok(())
}

pub(super) fn close(conn: &Connection, id: BallotId, at: Timestamp) -> Result<()> {
    let rows = conn.execute(
        "UPDATE ballots SET closed_at = ?1 WHERE id = ?2 AND closed_at IS NULL",
        params![to_nanos(at)?, id.to_string()],
    )?;
    if rows == 0 {
        return Err(StorageError::Corrupt(format!("close of missing or closed ballot {id}")));
    }
    Ok(())
}
