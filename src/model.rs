//! Core data model for the spy-cat agency.
//!
//! Three related records: agents, the missions they are assigned to,
//! and the targets each mission works through.

mod agent;
mod mission;
mod target;

pub use agent::{Agent, NewAgent};
pub use mission::{MAX_TARGETS, Mission, NewMission};
pub use target::{NewTarget, Target, TargetUpdate};
