//! Purpose: Backing-engine seam over a single SQLite connection.
//! Exports: `Engine` with point ops, scans, and explicit transaction cycling.
//! Role: Only module that speaks SQL; the store serializes all access to it.
//! Invariants: A read-write engine always has an open deferred transaction,
//! so mutations batch until `flush` commits and reopens one.
//! Invariants: Read-only engines never create the file and never hold a
//! transaction; `flush` is a no-op for them.
use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::error::{Error, ErrorKind};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS DATA(\
     ID TEXT NOT NULL UNIQUE, TIME TEXT NOT NULL, JSON TEXT NOT NULL, \
     PRIMARY KEY (ID))";

#[derive(Debug)]
pub struct Engine {
    conn: Connection,
    writable: bool,
}

impl Engine {
    /// Open or create the backing file and ensure the DATA table exists.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(|err| open_error(path, err))?;
        conn.execute(CREATE_TABLE, [])
            .map_err(|err| open_error(path, err))?;
        let engine = Self {
            conn,
            writable: true,
        };
        engine.begin()?;
        Ok(engine)
    }

    /// Connect to an existing file without permitting mutation. The file must
    /// already exist; SQLite's own open error surfaces if it does not.
    pub fn open_read_only(path: &Path) -> Result<Self, Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn =
            Connection::open_with_flags(path, flags).map_err(|err| open_error(path, err))?;
        Ok(Self {
            conn,
            writable: false,
        })
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.conn
            .query_row("SELECT COUNT(ID) FROM DATA", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(engine_error)
    }

    pub fn fetch(&self, id: &str) -> Result<Option<String>, Error> {
        self.conn
            .query_row("SELECT JSON FROM DATA WHERE ID = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(engine_error)
    }

    pub fn exists(&self, id: &str) -> Result<bool, Error> {
        self.conn
            .query_row("SELECT 1 FROM DATA WHERE ID = ?1", params![id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(engine_error)
    }

    pub fn upsert(&self, id: &str, stamp: &str, json: &str) -> Result<(), Error> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO DATA(ID, TIME, JSON) VALUES(?1, ?2, ?3)",
                params![id, stamp, json],
            )
            .map(drop)
            .map_err(engine_error)
    }

    /// Delete is a no-op when the id is absent.
    pub fn delete(&self, id: &str) -> Result<(), Error> {
        self.conn
            .execute("DELETE FROM DATA WHERE ID = ?1", params![id])
            .map(drop)
            .map_err(engine_error)
    }

    pub fn ids(&self) -> Result<Vec<String>, Error> {
        let mut stmt = self.conn.prepare("SELECT ID FROM DATA").map_err(engine_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(engine_error)?;
        rows.collect::<Result<_, _>>().map_err(engine_error)
    }

    /// All rows as raw `(id, json)` text, in SQLite's native scan order.
    pub fn rows(&self) -> Result<Vec<(String, String)>, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT ID, JSON FROM DATA")
            .map_err(engine_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(engine_error)?;
        rows.collect::<Result<_, _>>().map_err(engine_error)
    }

    /// Commit the open transaction atomically, then start the next batch.
    /// On commit failure the transaction is left open so a retry can run.
    pub fn flush(&self) -> Result<(), Error> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").map_err(|err| {
                Error::new(ErrorKind::Commit)
                    .with_message("engine flush failed")
                    .with_source(err)
            })?;
        }
        if self.writable {
            self.begin()?;
        }
        Ok(())
    }

    /// Release the connection. The caller flushes first; anything still
    /// pending in the open transaction is rolled back by SQLite.
    pub fn finish(self) -> Result<(), Error> {
        self.conn.close().map_err(|(_, err)| engine_error(err))
    }

    fn begin(&self) -> Result<(), Error> {
        self.conn.execute_batch("BEGIN").map_err(engine_error)
    }
}

fn open_error(path: &Path, err: rusqlite::Error) -> Error {
    Error::new(ErrorKind::Engine)
        .with_message("cannot open backing file")
        .with_path(path)
        .with_source(err)
}

fn engine_error(err: rusqlite::Error) -> Error {
    Error::new(ErrorKind::Engine).with_source(err)
}
