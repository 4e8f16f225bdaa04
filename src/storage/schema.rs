//! Schema versioning and migrations.
//!
//! The `schema_version` table holds a single row. Migrations run in order
//! from the stored version to [`CURRENT_SCHEMA_VERSION`].
//!
//! Timestamps are stored as integer nanoseconds since the Unix epoch so
//! they sort and compare in SQL.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::{Result, StorageError};

pub(super) const CURRENT_SCHEMA_VERSION: i64 = 1;

pub(super) fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             version INTEGER NOT NULL
         );",
    )?;

    let found: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);

    if found > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    if found < 1 {
        conn.execute_batch(
            "CREATE TABLE documents (
                 name TEXT PRIMARY KEY,
                 rev TEXT NOT NULL,
                 stream TEXT NOT NULL,
                 grp TEXT,
                 ad TEXT,
                 authors TEXT NOT NULL,
                 expires INTEGER,
                 time INTEGER NOT NULL,
                 last_seq INTEGER NOT NULL
             );

             CREATE TABLE document_states (
                 document TEXT NOT NULL REFERENCES documents(name),
                 axis TEXT NOT NULL,
                 state TEXT NOT NULL,
                 PRIMARY KEY (document, axis)
             );
             CREATE INDEX idx_document_states_axis ON document_states(axis, state);

             CREATE TABLE document_tags (
                 document TEXT NOT NULL REFERENCES documents(name),
                 tag TEXT NOT NULL,
                 PRIMARY KEY (document, tag)
             );

             CREATE TABLE action_holders (
                 document TEXT NOT NULL REFERENCES documents(name),
                 ordinal INTEGER NOT NULL,
                 email TEXT NOT NULL,
                 name TEXT NOT NULL,
                 since INTEGER NOT NULL,
                 PRIMARY KEY (document, email)
             );

             CREATE TABLE doc_events (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 document TEXT NOT NULL REFERENCES documents(name),
                 seq INTEGER NOT NULL,
                 rev TEXT NOT NULL,
                 kind TEXT NOT NULL,
                 actor TEXT NOT NULL,
                 time INTEGER NOT NULL,
                 description TEXT NOT NULL,
                 payload TEXT NOT NULL,
                 UNIQUE (document, seq)
             );
             CREATE INDEX idx_doc_events_kind ON doc_events(document, kind, seq);

             CREATE TABLE ballots (
                 id TEXT PRIMARY KEY,
                 document TEXT NOT NULL REFERENCES documents(name),
                 purpose TEXT NOT NULL,
                 opened_by TEXT NOT NULL,
                 opened_at INTEGER NOT NULL,
                 due INTEGER,
                 closed_at INTEGER
             );
             CREATE UNIQUE INDEX idx_ballots_one_open
                 ON ballots(document, purpose) WHERE closed_at IS NULL;",
        )?;
    }

    conn.execute(
        "INSERT INTO schema_version (id, version) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
        [CURRENT_SCHEMA_VERSION],
    )?;
    info!(from = found, to = CURRENT_SCHEMA_VERSION, "migrated database schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_fresh_database_once() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn refuses_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute("UPDATE schema_version SET version = 99", [])
            .unwrap();
        assert!(matches!(
            migrate(&conn),
            Err(StorageError::SchemaTooNew { found: 99, .. })
        ));
    }
}
