//! Mission storage: creation with targets, assignment, completion, and the
//! cascading delete shared with agent removal.

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use crate::model::{MAX_TARGETS, Mission, NewMission};

use super::{
    Result, Storage, StorageError, agent::agent_exists, cascade, is_unique_violation, target,
};

/// Whether a mission delete honours the "must be unassigned" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AssignmentGuard {
    /// Refuse to delete missions that have an agent.
    Enforce,
    /// Delete regardless of assignment; used when the agent itself goes away.
    Ignore,
}

impl Storage {
    /// Creates a mission and its targets atomically. Returns the mission id.
    ///
    /// The target count must be within `1..=3`. When an agent is given it
    /// must exist and must not already hold an active mission.
    pub fn create_mission(&self, mission: &NewMission) -> Result<i64> {
        let count = mission.targets.len();
        if !(1..=MAX_TARGETS).contains(&count) {
            return Err(StorageError::InvalidTargetCount(count));
        }
        if mission.complete && mission.targets.iter().any(|t| !t.complete) {
            return Err(StorageError::IncompleteNewTargets);
        }

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(agent_id) = mission.agent_id {
            if !agent_exists(&tx, agent_id)? {
                return Err(StorageError::AgentNotFound(agent_id));
            }
            if agent_has_active_mission(&tx, agent_id, None)? {
                return Err(StorageError::AgentBusy(agent_id));
            }
        }

        tx.execute(
            "INSERT INTO missions (agent_id, complete) VALUES (?1, ?2)",
            params![mission.agent_id, mission.complete],
        )
        .map_err(|e| busy_or(e, mission.agent_id))?;
        let mission_id = tx.last_insert_rowid();

        for new in &mission.targets {
            target::insert(&tx, mission_id, new)?;
        }

        tx.commit()?;
        tracing::debug!(mission_id, targets = count, "mission created");
        Ok(mission_id)
    }

    /// Assigns an agent to a mission, replacing any previous assignee.
    ///
    /// Fails with [`StorageError::AgentBusy`] when the agent already holds a
    /// different active mission.
    pub fn assign_agent(&self, mission_id: i64, agent_id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !mission_exists(&tx, mission_id)? {
            return Err(StorageError::MissionNotFound(mission_id));
        }
        if !agent_exists(&tx, agent_id)? {
            return Err(StorageError::AgentNotFound(agent_id));
        }
        if agent_has_active_mission(&tx, agent_id, Some(mission_id))? {
            return Err(StorageError::AgentBusy(agent_id));
        }

        tx.execute(
            "UPDATE missions SET agent_id = ?1 WHERE id = ?2",
            params![agent_id, mission_id],
        )
        .map_err(|e| busy_or(e, Some(agent_id)))?;
        tx.commit()?;
        Ok(())
    }

    /// Sets a mission's completion flag.
    ///
    /// Completing requires every target of the mission to be complete.
    /// Reopening is not guarded here, but still fails with
    /// [`StorageError::AgentBusy`] if the assignee has since taken another
    /// active mission.
    pub fn set_mission_complete(&self, id: i64, complete: bool) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let agent_id: Option<i64> = tx
            .query_row("SELECT agent_id FROM missions WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(StorageError::MissionNotFound(id))?;

        if complete && !all_targets_complete(&tx, id)? {
            return Err(StorageError::IncompleteTargets(id));
        }

        tx.execute(
            "UPDATE missions SET complete = ?1 WHERE id = ?2",
            params![complete, id],
        )
        .map_err(|e| busy_or(e, agent_id))?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes an unassigned mission together with its targets.
    pub fn delete_mission(&self, id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !mission_exists(&tx, id)? {
            return Err(StorageError::MissionNotFound(id));
        }
        delete_missions(&tx, &[id], AssignmentGuard::Enforce)?;

        tx.commit().map_err(cascade("commit mission delete"))?;
        Ok(())
    }

    /// Returns whether a mission with this id exists.
    pub fn mission_exists(&self, id: i64) -> Result<bool> {
        mission_exists(&self.lock(), id)
    }

    /// Loads a mission with its targets, or `None` if it doesn't exist.
    pub fn get_mission(&self, id: i64) -> Result<Option<Mission>> {
        let conn = self.lock();
        let Some(mut mission) = conn
            .query_row(
                "SELECT id, agent_id, complete FROM missions WHERE id = ?1",
                [id],
                mission_from_row,
            )
            .optional()?
        else {
            return Ok(None);
        };
        mission.targets = target::load_for_mission(&conn, id)?;
        Ok(Some(mission))
    }

    /// Lists all missions with their targets, ordered by id.
    pub fn list_missions(&self) -> Result<Vec<Mission>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, agent_id, complete FROM missions ORDER BY id")?;
        let mut missions = stmt
            .query_map([], mission_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for mission in &mut missions {
            mission.targets = target::load_for_mission(&conn, mission.id)?;
        }
        Ok(missions)
    }
}

/// Deletes the given missions and all of their targets inside `tx`.
///
/// With [`AssignmentGuard::Enforce`], any assigned mission aborts the whole
/// call before anything is deleted. Ids that don't exist are skipped.
/// Returns how many missions were deleted.
pub(super) fn delete_missions(
    tx: &Transaction<'_>,
    ids: &[i64],
    guard: AssignmentGuard,
) -> Result<usize> {
    if guard == AssignmentGuard::Enforce {
        for &id in ids {
            let agent_id: Option<Option<i64>> = tx
                .query_row("SELECT agent_id FROM missions WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(cascade("read mission assignment"))?;
            if let Some(Some(_)) = agent_id {
                return Err(StorageError::MissionAssigned(id));
            }
        }
    }

    let mut deleted = 0;
    for &id in ids {
        let targets = tx
            .execute("DELETE FROM targets WHERE mission_id = ?1", [id])
            .map_err(cascade("delete mission targets"))?;
        let rows = tx
            .execute("DELETE FROM missions WHERE id = ?1", [id])
            .map_err(cascade("delete mission row"))?;
        if rows > 0 {
            tracing::debug!(mission_id = id, targets, "deleted mission");
        }
        deleted += rows;
    }
    Ok(deleted)
}

/// Ids of every mission, active or complete, that references `agent_id`.
pub(super) fn mission_ids_for_agent(conn: &Connection, agent_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT id FROM missions WHERE agent_id = ?1 ORDER BY id")
        .map_err(cascade("find agent missions"))?;
    let ids = stmt
        .query_map([agent_id], |row| row.get::<_, i64>(0))
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(cascade("find agent missions"))?;
    Ok(ids)
}

fn mission_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mission> {
    Ok(Mission {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        complete: row.get(2)?,
        targets: Vec::new(),
    })
}

fn mission_exists(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM missions WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// Whether the agent is the assignee of an incomplete mission other than
/// `except`.
fn agent_has_active_mission(conn: &Connection, agent_id: i64, except: Option<i64>) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM missions
             WHERE agent_id = ?1 AND complete = 0 AND id IS NOT ?2
         )",
        params![agent_id, except],
        |row| row.get(0),
    )?)
}

/// Whether no target under the mission is still incomplete.
fn all_targets_complete(conn: &Connection, mission_id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT NOT EXISTS(SELECT 1 FROM targets WHERE mission_id = ?1 AND complete = 0)",
        [mission_id],
        |row| row.get(0),
    )?)
}

/// Maps a hit on the one-active-mission index to [`StorageError::AgentBusy`].
fn busy_or(err: rusqlite::Error, agent_id: Option<i64>) -> StorageError {
    match agent_id {
        Some(agent_id) if is_unique_violation(&err) => StorageError::AgentBusy(agent_id),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::NewTarget;
    use crate::storage::ErrorKind;
    use crate::storage::fixtures::*;

    fn complete_all_targets(storage: &Storage, mission_id: i64) {
        let mission = storage.get_mission(mission_id).unwrap().unwrap();
        for t in mission.targets {
            storage.update_target_complete(t.id, true).unwrap();
        }
    }

    #[test]
    fn create_and_load_mission_round_trips_targets() {
        let (_dir, storage) = test_storage();
        let new = NewMission {
            agent_id: None,
            targets: vec![
                NewTarget::new("Mr. Whiskers", "France", "Likes cream"),
                NewTarget::new("Dr. Paws", "Japan", ""),
            ],
            complete: false,
        };

        let id = storage.create_mission(&new).unwrap();
        let loaded = storage.get_mission(id).unwrap().unwrap();

        assert_eq!(loaded.id, id);
        assert_eq!(loaded.agent_id, None);
        assert!(!loaded.complete);
        assert_eq!(loaded.targets.len(), 2);
        for (stored, given) in loaded.targets.iter().zip(&new.targets) {
            assert_eq!(stored.mission_id, id);
            assert_eq!(stored.name, given.name);
            assert_eq!(stored.country, given.country);
            assert_eq!(stored.notes, given.notes);
            assert!(!stored.complete);
        }
    }

    #[test]
    fn create_with_one_to_three_targets_persists_exactly_that_many() {
        let (_dir, storage) = test_storage();

        for names in [&["a"][..], &["a", "b"], &["a", "b", "c"]] {
            let id = storage.create_mission(&mission(None, names)).unwrap();
            let loaded = storage.get_mission(id).unwrap().unwrap();
            assert_eq!(loaded.targets.len(), names.len());
        }
        assert_eq!(count_rows(&storage, "targets"), 6);
    }

    #[test]
    fn create_with_zero_or_four_targets_fails() {
        let (_dir, storage) = test_storage();

        let err = storage.create_mission(&mission(None, &[])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTargetCount(0)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = storage
            .create_mission(&mission(None, &["a", "b", "c", "d"]))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidTargetCount(4)));

        assert_eq!(count_rows(&storage, "missions"), 0);
        assert_eq!(count_rows(&storage, "targets"), 0);
    }

    #[test]
    fn create_with_unknown_agent_fails_without_partial_rows() {
        let (_dir, storage) = test_storage();

        let err = storage
            .create_mission(&mission(Some(42), &["a", "b"]))
            .unwrap_err();

        assert!(matches!(err, StorageError::AgentNotFound(42)));
        assert_eq!(count_rows(&storage, "missions"), 0);
        assert_eq!(count_rows(&storage, "targets"), 0);
    }

    #[test]
    fn failed_target_insert_rolls_back_the_mission() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        storage
            .lock()
            .execute_batch(
                "CREATE TRIGGER refuse_boom BEFORE INSERT ON targets
                 WHEN NEW.name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        let err = storage
            .create_mission(&mission(Some(felix), &["a", "boom"]))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(count_rows(&storage, "missions"), 0);
        assert_eq!(count_rows(&storage, "targets"), 0);

        // The rolled-back mission didn't leave the agent busy.
        storage
            .create_mission(&mission(Some(felix), &["a"]))
            .unwrap();
    }

    #[test]
    fn create_complete_mission_requires_complete_targets() {
        let (_dir, storage) = test_storage();
        let mut new = mission(None, &["a"]);
        new.complete = true;

        let err = storage.create_mission(&new).unwrap_err();
        assert!(matches!(err, StorageError::IncompleteNewTargets));

        new.targets[0].complete = true;
        let id = storage.create_mission(&new).unwrap();
        let loaded = storage.get_mission(id).unwrap().unwrap();
        assert!(loaded.complete);
        assert!(loaded.targets[0].complete);
    }

    #[test]
    fn create_with_busy_agent_conflicts() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        storage.create_mission(&mission(Some(felix), &["a"])).unwrap();

        let err = storage
            .create_mission(&mission(Some(felix), &["b"]))
            .unwrap_err();

        assert!(matches!(err, StorageError::AgentBusy(id) if id == felix));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(count_rows(&storage, "missions"), 1);
    }

    #[test]
    fn assign_then_conflict_while_first_mission_is_incomplete() {
        let (_dir, storage) = test_storage();
        let felix = storage
            .create_agent(&crate::model::NewAgent {
                name: "Felix".into(),
                years_of_experience: 3,
                breed: "Persian".into(),
                salary: 1200.0,
            })
            .unwrap();
        let first = storage
            .create_mission(&NewMission {
                agent_id: None,
                targets: vec![NewTarget::new("Paris", "France", "")],
                complete: false,
            })
            .unwrap();
        let second = storage.create_mission(&mission(None, &["Rome"])).unwrap();

        storage.assign_agent(first, felix).unwrap();
        let err = storage.assign_agent(second, felix).unwrap_err();

        assert!(matches!(err, StorageError::AgentBusy(_)));
        assert_eq!(
            storage.get_mission(first).unwrap().unwrap().agent_id,
            Some(felix)
        );
        assert_eq!(storage.get_mission(second).unwrap().unwrap().agent_id, None);
    }

    #[test]
    fn assign_is_allowed_once_previous_mission_completes() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let first = storage.create_mission(&mission(Some(felix), &["a"])).unwrap();
        let second = storage.create_mission(&mission(None, &["b"])).unwrap();

        complete_all_targets(&storage, first);
        storage.set_mission_complete(first, true).unwrap();
        storage.assign_agent(second, felix).unwrap();

        assert_eq!(
            storage.get_mission(second).unwrap().unwrap().agent_id,
            Some(felix)
        );
    }

    #[test]
    fn reassigning_same_agent_to_same_mission_is_fine() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let id = storage.create_mission(&mission(Some(felix), &["a"])).unwrap();

        storage.assign_agent(id, felix).unwrap();
    }

    #[test]
    fn assign_replaces_previous_agent() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let tom = storage.create_agent(&agent("Tom")).unwrap();
        let id = storage.create_mission(&mission(Some(felix), &["a"])).unwrap();

        storage.assign_agent(id, tom).unwrap();

        assert_eq!(storage.get_mission(id).unwrap().unwrap().agent_id, Some(tom));
        // Felix is free again.
        let other = storage.create_mission(&mission(Some(felix), &["b"]));
        assert!(other.is_ok());
    }

    #[test]
    fn assign_missing_mission_or_agent_fails() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let id = storage.create_mission(&mission(None, &["a"])).unwrap();

        let err = storage.assign_agent(999, felix).unwrap_err();
        assert!(matches!(err, StorageError::MissionNotFound(999)));

        let err = storage.assign_agent(id, 999).unwrap_err();
        assert!(matches!(err, StorageError::AgentNotFound(999)));
    }

    #[test]
    fn complete_requires_all_targets_complete() {
        let (_dir, storage) = test_storage();
        let id = storage.create_mission(&mission(None, &["a", "b"])).unwrap();
        let targets = storage.get_mission(id).unwrap().unwrap().targets;

        storage.update_target_complete(targets[0].id, true).unwrap();
        let err = storage.set_mission_complete(id, true).unwrap_err();
        assert!(matches!(err, StorageError::IncompleteTargets(_)));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(!storage.get_mission(id).unwrap().unwrap().complete);

        storage.update_target_complete(targets[1].id, true).unwrap();
        storage.set_mission_complete(id, true).unwrap();

        let mission = storage.get_mission(id).unwrap().unwrap();
        assert!(mission.complete);
        assert!(mission.targets.iter().all(|t| t.complete));
    }

    #[test]
    fn set_complete_false_is_unconditional() {
        let (_dir, storage) = test_storage();
        let id = storage.create_mission(&mission(None, &["a"])).unwrap();

        storage.set_mission_complete(id, false).unwrap();
        complete_all_targets(&storage, id);
        storage.set_mission_complete(id, true).unwrap();
        storage.set_mission_complete(id, false).unwrap();

        assert!(!storage.get_mission(id).unwrap().unwrap().complete);
    }

    #[test]
    fn reopening_conflicts_when_agent_moved_on() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let first = storage.create_mission(&mission(Some(felix), &["a"])).unwrap();
        complete_all_targets(&storage, first);
        storage.set_mission_complete(first, true).unwrap();
        storage.create_mission(&mission(Some(felix), &["b"])).unwrap();

        let err = storage.set_mission_complete(first, false).unwrap_err();

        assert!(matches!(err, StorageError::AgentBusy(id) if id == felix));
        assert!(storage.get_mission(first).unwrap().unwrap().complete);
    }

    #[test]
    fn set_complete_on_missing_mission_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.set_mission_complete(7, true).unwrap_err();
        assert!(matches!(err, StorageError::MissionNotFound(7)));
    }

    #[test]
    fn delete_unassigned_mission_removes_targets() {
        let (_dir, storage) = test_storage();
        let id = storage.create_mission(&mission(None, &["a", "b"])).unwrap();

        storage.delete_mission(id).unwrap();

        assert!(!storage.mission_exists(id).unwrap());
        assert_eq!(count_rows(&storage, "targets"), 0);
    }

    #[test]
    fn delete_complete_unassigned_mission_is_allowed() {
        let (_dir, storage) = test_storage();
        let id = storage.create_mission(&mission(None, &["a"])).unwrap();
        complete_all_targets(&storage, id);
        storage.set_mission_complete(id, true).unwrap();

        storage.delete_mission(id).unwrap();
        assert!(storage.get_mission(id).unwrap().is_none());
    }

    #[test]
    fn delete_assigned_mission_fails_and_keeps_everything() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let id = storage
            .create_mission(&mission(Some(felix), &["a", "b"]))
            .unwrap();

        let err = storage.delete_mission(id).unwrap_err();

        assert!(matches!(err, StorageError::MissionAssigned(_)));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(storage.mission_exists(id).unwrap());
        assert_eq!(count_rows(&storage, "targets"), 2);
    }

    #[test]
    fn delete_missing_mission_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.delete_mission(3).unwrap_err();
        assert!(matches!(err, StorageError::MissionNotFound(3)));
    }

    #[test]
    fn list_missions_returns_all_with_targets() {
        let (_dir, storage) = test_storage();
        assert!(storage.list_missions().unwrap().is_empty());

        let first = storage.create_mission(&mission(None, &["a"])).unwrap();
        let second = storage.create_mission(&mission(None, &["b", "c"])).unwrap();

        let missions = storage.list_missions().unwrap();
        assert_eq!(missions.len(), 2);
        assert_eq!(missions[0].id, first);
        assert_eq!(missions[0].targets.len(), 1);
        assert_eq!(missions[1].id, second);
        assert_eq!(missions[1].targets.len(), 2);
    }

    #[test]
    fn at_most_one_active_mission_per_agent_holds_across_operations() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let ids: Vec<i64> = (0..3)
            .map(|i| {
                storage
                    .create_mission(&mission(None, &[format!("t{i}").as_str()]))
                    .unwrap()
            })
            .collect();

        for &id in &ids {
            let _ = storage.assign_agent(id, felix);
        }

        let active = storage
            .list_missions()
            .unwrap()
            .into_iter()
            .filter(|m| m.agent_id == Some(felix) && m.is_active())
            .count();
        assert_eq!(active, 1);
    }

    #[test]
    fn concurrent_assignments_of_one_agent_let_exactly_one_win() {
        let (_dir, storage) = test_storage();
        let felix = storage.create_agent(&agent("Felix")).unwrap();
        let ids: Vec<i64> = (0..8)
            .map(|i| {
                storage
                    .create_mission(&mission(None, &[format!("t{i}").as_str()]))
                    .unwrap()
            })
            .collect();

        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .iter()
                .map(|&id| {
                    let storage = &storage;
                    scope.spawn(move || storage.assign_agent(id, felix))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, StorageError::AgentBusy(id) if *id == felix))
        );
        let assigned: Vec<i64> = storage
            .list_missions()
            .unwrap()
            .into_iter()
            .filter(|m| m.agent_id == Some(felix) && m.is_active())
            .map(|m| m.id)
            .collect();
        assert_eq!(assigned.len(), 1);
    }
}
