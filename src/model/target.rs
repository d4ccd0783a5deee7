//! Target types: the atomic objectives inside a mission.

use serde::{Deserialize, Serialize};

/// A stored target.
///
/// Once `complete` is set, the target can no longer be edited or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,

    /// Set at creation and never changed.
    pub mission_id: i64,

    pub name: String,
    pub country: String,
    pub notes: String,
    pub complete: bool,
}

/// A target supplied as part of mission creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTarget {
    pub name: String,
    pub country: String,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub complete: bool,
}

impl NewTarget {
    /// An incomplete target with the given fields.
    pub fn new(
        name: impl Into<String>,
        country: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            country: country.into(),
            notes: notes.into(),
            complete: false,
        }
    }
}

/// Full replacement of a target's mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub name: String,
    pub country: String,
    pub notes: String,
    pub complete: bool,
}
