//! Mission types: an assignment unit owning up to three targets.

use serde::{Deserialize, Serialize};

use super::{NewTarget, Target};

/// The most targets a mission can ever hold.
pub const MAX_TARGETS: usize = 3;

/// A stored mission together with its targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: i64,

    /// The assigned agent, if any.
    ///
    /// Serialized as `cat_id` to match the spy-cat resource naming.
    #[serde(rename = "cat_id")]
    pub agent_id: Option<i64>,

    pub complete: bool,

    /// Ordered by target id.
    pub targets: Vec<Target>,
}

impl Mission {
    /// Whether this mission counts against its agent's single active slot.
    pub fn is_active(&self) -> bool {
        !self.complete
    }
}

/// Fields required to create a mission.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMission {
    pub agent_id: Option<i64>,
    pub targets: Vec<NewTarget>,
    pub complete: bool,
}
