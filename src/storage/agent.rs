//! Agent storage: create, update salary, cascading delete, and lookups.

use rusqlite::{OptionalExtension, TransactionBehavior};

use crate::model::{Agent, NewAgent};

use super::{
    Result, Storage, StorageError, cascade, is_unique_violation,
    mission::{AssignmentGuard, delete_missions, mission_ids_for_agent},
};

impl Storage {
    /// Creates an agent and returns its id. Names are unique.
    pub fn create_agent(&self, agent: &NewAgent) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO agents (name, years_of_experience, breed, salary)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                &agent.name,
                agent.years_of_experience,
                &agent.breed,
                agent.salary,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::DuplicateAgentName(agent.name.clone())
            } else {
                e.into()
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    /// Updates an agent's salary.
    pub fn update_salary(&self, id: i64, salary: f64) -> Result<()> {
        let rows = self.lock().execute(
            "UPDATE agents SET salary = ?1 WHERE id = ?2",
            rusqlite::params![salary, id],
        )?;
        if rows == 0 {
            return Err(StorageError::AgentNotFound(id));
        }
        Ok(())
    }

    /// Deletes an agent along with every mission it was ever assigned to,
    /// and those missions' targets.
    ///
    /// All rows go in one transaction; if any step fails nothing is removed.
    pub fn delete_agent(&self, id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !agent_exists(&tx, id)? {
            return Err(StorageError::AgentNotFound(id));
        }

        let missions = mission_ids_for_agent(&tx, id)?;
        let deleted = delete_missions(&tx, &missions, AssignmentGuard::Ignore)?;
        tx.execute("DELETE FROM agents WHERE id = ?1", [id])
            .map_err(cascade("delete agent row"))?;

        tx.commit().map_err(cascade("commit agent delete"))?;
        tracing::debug!(agent_id = id, missions = deleted, "deleted agent");
        Ok(())
    }

    pub fn agent_exists(&self, id: i64) -> Result<bool> {
        agent_exists(&self.lock(), id)
    }

    /// Loads an agent, or `None` if it doesn't exist.
    pub fn get_agent(&self, id: i64) -> Result<Option<Agent>> {
        Ok(self
            .lock()
            .query_row(
                "SELECT id, name, years_of_experience, breed, salary
                 FROM agents WHERE id = ?1",
                [id],
                agent_from_row,
            )
            .optional()?)
    }

    /// Lists all agents ordered by id.
    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, years_of_experience, breed, salary
             FROM agents ORDER BY id",
        )?;
        let agents = stmt
            .query_map([], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }
}

pub(super) fn agent_exists(conn: &rusqlite::Connection, id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM agents WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

fn agent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        years_of_experience: row.get(2)?,
        breed: row.get(3)?,
        salary: row.get(4)?,
    })
}
