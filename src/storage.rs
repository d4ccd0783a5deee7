//! Local persistence for agents, missions, and targets.
//!
//! Everything lives in one SQLite database:
//!
//! ```text
//! agents    (id, name UNIQUE, years_of_experience, breed, salary)
//! missions  (id, agent_id NULL -> agents.id, complete)
//! targets   (id, mission_id -> missions.id, name, country, notes, complete)
//! ```
//!
//! A single connection is shared by every caller behind a mutex, so the
//! store is single-writer by construction. Every operation that reads state
//! to decide whether a write is allowed runs the read and the write inside
//! one `IMMEDIATE` transaction. A partial unique index additionally keeps
//! each agent on at most one active mission at the storage layer.

mod agent;
mod mission;
mod target;

use std::{
    fs, io,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use rusqlite::{Connection, ffi};

use crate::model::MAX_TARGETS;

/// How a failure should be reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The referenced record does not exist.
    NotFound,
    /// A uniqueness or exclusivity rule would be broken.
    Conflict,
    /// The record is in a state that forbids the operation.
    PreconditionFailed,
    /// The input itself is unacceptable.
    InvalidArgument,
    /// The database failed underneath us.
    Internal,
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("agent not found: {0}")]
    AgentNotFound(i64),

    #[error("mission not found: {0}")]
    MissionNotFound(i64),

    #[error("target not found: {0}")]
    TargetNotFound(i64),

    #[error("agent name already taken: {0}")]
    DuplicateAgentName(String),

    #[error("agent {0} is already assigned to an active mission")]
    AgentBusy(i64),

    #[error("a mission needs between 1 and {max} targets, got {0}", max = MAX_TARGETS)]
    InvalidTargetCount(usize),

    #[error("mission {0} already has {max} targets", max = MAX_TARGETS)]
    TargetLimit(i64),

    #[error("mission {0} is complete")]
    MissionComplete(i64),

    #[error("target {0} is complete")]
    TargetComplete(i64),

    #[error("mission {0} has incomplete targets")]
    IncompleteTargets(i64),

    #[error("a mission created as complete cannot carry incomplete targets")]
    IncompleteNewTargets,

    #[error("mission {0} is assigned to an agent")]
    MissionAssigned(i64),

    #[error("{context}: {source}")]
    Cascade {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i64, supported: usize },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Classifies the error for the boundary layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AgentNotFound(_) | Self::MissionNotFound(_) | Self::TargetNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::DuplicateAgentName(_) | Self::AgentBusy(_) => ErrorKind::Conflict,
            Self::TargetLimit(_)
            | Self::MissionComplete(_)
            | Self::TargetComplete(_)
            | Self::IncompleteTargets(_)
            | Self::IncompleteNewTargets
            | Self::MissionAssigned(_) => ErrorKind::PreconditionFailed,
            Self::InvalidTargetCount(_) => ErrorKind::InvalidArgument,
            Self::Cascade { .. } | Self::UnsupportedSchema { .. } | Self::Sqlite(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Schema migrations, applied in order. `PRAGMA user_version` records how
/// many have run.
const MIGRATIONS: &[&str] = &["
CREATE TABLE agents (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT    NOT NULL UNIQUE,
    years_of_experience INTEGER NOT NULL CHECK (years_of_experience >= 0),
    breed               TEXT    NOT NULL,
    salary              REAL    NOT NULL CHECK (salary > 0)
);

CREATE TABLE missions (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id INTEGER REFERENCES agents(id),
    complete INTEGER NOT NULL DEFAULT 0
);

-- An agent may hold at most one active mission.
CREATE UNIQUE INDEX missions_one_active_per_agent
    ON missions(agent_id)
    WHERE agent_id IS NOT NULL AND complete = 0;

CREATE TABLE targets (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id INTEGER NOT NULL REFERENCES missions(id),
    name       TEXT    NOT NULL,
    country    TEXT    NOT NULL,
    notes      TEXT    NOT NULL DEFAULT '',
    complete   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX targets_by_mission ON targets(mission_id);
"];

/// SQLite-backed storage for agents, missions, and targets.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (or creates) the database at `path` and brings its schema up
    /// to date.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), "opening database");
        Self::init(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Locks the shared connection.
    ///
    /// A poisoned lock still guards a usable connection: any transaction
    /// open when the holder panicked was rolled back on drop.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let applied = usize::try_from(found)
        .ok()
        .filter(|&n| n <= MIGRATIONS.len())
        .ok_or(StorageError::UnsupportedSchema {
            found,
            supported: MIGRATIONS.len(),
        })?;

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied) {
        let version = index + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(version, "applied schema migration");
    }
    Ok(())
}

/// Whether `err` came from a `UNIQUE` constraint or unique index.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Wraps a database failure hit mid-cascade with the step that failed.
fn cascade(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StorageError {
    move |source| StorageError::Cascade { context, source }
}
