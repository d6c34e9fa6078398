//! Multi-agent orchestration: towns own rigs, rigs own beads, agents, mail
//! and a merge queue, and one actor per rig serializes everything that
//! touches a rig's state.

pub mod adapters;
pub mod config;
pub mod db;
pub mod engines;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod ports;
pub mod rig_actor;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{load_config, Config, SchedulerSettings};
pub use db::{Database, RigStore};
pub use error::{GastownError, Result};
pub use orchestrator::Orchestrator;
pub use rig_actor::RigHandle;
pub use types::*;
