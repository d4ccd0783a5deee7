//! Target storage.
//!
//! A complete target is frozen: its fields can't be edited, it can't be
//! reopened, and it can't be deleted.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::model::{MAX_TARGETS, NewTarget, Target, TargetUpdate};

use super::{Result, Storage, StorageError};

const TARGET_COLUMNS: &str = "id, mission_id, name, country, notes, complete";

impl Storage {
    /// Adds an incomplete target to an open mission with room left.
    pub fn add_target(&self, mission_id: i64, name: &str, country: &str, notes: &str) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let complete: bool = tx
            .query_row(
                "SELECT complete FROM missions WHERE id = ?1",
                [mission_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::MissionNotFound(mission_id))?;
        if complete {
            return Err(StorageError::MissionComplete(mission_id));
        }

        let count: usize = tx.query_row(
            "SELECT COUNT(*) FROM targets WHERE mission_id = ?1",
            [mission_id],
            |row| row.get(0),
        )?;
        if count >= MAX_TARGETS {
            return Err(StorageError::TargetLimit(mission_id));
        }

        let id = insert(&tx, mission_id, &NewTarget::new(name, country, notes))?;
        tx.commit()?;
        Ok(id)
    }

    /// Replaces a target's notes.
    pub fn update_target_notes(&self, id: i64, notes: &str) -> Result<()> {
        self.patch_target(id, Some(notes), None)
    }

    /// Sets a target's completion flag.
    ///
    /// The parent mission's state doesn't matter here. Marking a complete
    /// target complete again is a no-op; reopening one fails.
    pub fn update_target_complete(&self, id: i64, complete: bool) -> Result<()> {
        self.patch_target(id, None, Some(complete))
    }

    /// Edits notes, then completion, in one transaction.
    ///
    /// If either step fails neither change is kept. With both fields absent
    /// this only checks that the target exists.
    pub fn patch_target(&self, id: i64, notes: Option<&str>, complete: Option<bool>) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(notes) = notes {
            set_notes(&tx, id, notes)?;
        }
        match complete {
            Some(complete) => set_complete(&tx, id, complete)?,
            None if notes.is_none() => {
                target_complete(&tx, id)?;
            }
            None => {}
        }

        tx.commit()?;
        Ok(())
    }

    /// Replaces every mutable field of a target.
    pub fn update_target(&self, id: i64, update: &TargetUpdate) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_editable(&tx, id)?;
        tx.execute(
            "UPDATE targets SET name = ?1, country = ?2, notes = ?3, complete = ?4
             WHERE id = ?5",
            params![update.name, update.country, update.notes, update.complete, id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes a target that hasn't been completed.
    pub fn delete_target(&self, id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if target_complete(&tx, id)? {
            return Err(StorageError::TargetComplete(id));
        }

        tx.execute("DELETE FROM targets WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn target_exists(&self, id: i64) -> Result<bool> {
        Ok(self.lock().query_row(
            "SELECT EXISTS(SELECT 1 FROM targets WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?)
    }

    pub fn get_target(&self, id: i64) -> Result<Option<Target>> {
        Ok(self
            .lock()
            .query_row(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?1"),
                [id],
                target_from_row,
            )
            .optional()?)
    }
}

/// Inserts one target row under `mission_id`.
pub(super) fn insert(conn: &Connection, mission_id: i64, target: &NewTarget) -> Result<i64> {
    conn.execute(
        "INSERT INTO targets (mission_id, name, country, notes, complete)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            mission_id,
            target.name,
            target.country,
            target.notes,
            target.complete
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Loads a mission's targets ordered by id.
pub(super) fn load_for_mission(conn: &Connection, mission_id: i64) -> Result<Vec<Target>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TARGET_COLUMNS} FROM targets WHERE mission_id = ?1 ORDER BY id"
    ))?;
    let targets = stmt
        .query_map([mission_id], target_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(targets)
}

/// The target's completion flag, or `TargetNotFound`.
fn target_complete(conn: &Connection, id: i64) -> Result<bool> {
    conn.query_row("SELECT complete FROM targets WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or(StorageError::TargetNotFound(id))
}

fn set_notes(conn: &Connection, id: i64, notes: &str) -> Result<()> {
    ensure_editable(conn, id)?;
    conn.execute(
        "UPDATE targets SET notes = ?1 WHERE id = ?2",
        params![notes, id],
    )?;
    Ok(())
}

fn set_complete(conn: &Connection, id: i64, complete: bool) -> Result<()> {
    match (target_complete(conn, id)?, complete) {
        (true, true) => Ok(()),
        (true, false) => Err(StorageError::TargetComplete(id)),
        (false, _) => {
            conn.execute(
                "UPDATE targets SET complete = ?1 WHERE id = ?2",
                params![complete, id],
            )?;
            Ok(())
        }
    }
}

/// Fails unless the target exists and neither it nor its mission is complete.
fn ensure_editable(conn: &Connection, id: i64) -> Result<()> {
    let (mission_id, target_complete, mission_complete): (i64, bool, bool) = conn
        .query_row(
            "SELECT t.mission_id, t.complete, m.complete
             FROM targets t JOIN missions m ON m.id = t.mission_id
             WHERE t.id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or(StorageError::TargetNotFound(id))?;

    if target_complete {
        return Err(StorageError::TargetComplete(id));
    }
    if mission_complete {
        return Err(StorageError::MissionComplete(mission_id));
    }
    Ok(())
}

fn target_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        id: row.get(0)?,
        mission_id: row.get(1)?,
        name: row.get(2)?,
        country: row.get(3)?,
        notes: row.get(4)?,
        complete: row.get(5)?,
    })
}
