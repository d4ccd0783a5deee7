//! Agent types: the spy cats that missions are assigned to.

use serde::{Deserialize, Serialize};

/// A stored agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,

    /// Unique across all agents.
    pub name: String,

    pub years_of_experience: u32,

    /// Must be a breed known to the breed cache at creation time.
    pub breed: String,

    pub salary: f64,
}

/// Fields required to create an agent. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAgent {
    pub name: String,
    pub years_of_experience: u32,
    pub breed: String,
    pub salary: f64,
}
