#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use super::identifiers::{AgentId, BeadId, RigId};
use super::unknown_value;
use crate::error::{GastownError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Implementer.
    Polecat,
    /// Reviewer.
    Refinery,
    /// Conversational coordinator.
    Mayor,
    /// Liveness monitor.
    Witness,
}

impl AgentRole {
    pub const ALL: [&'static str; 4] = ["polecat", "refinery", "mayor", "witness"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Polecat => "polecat",
            Self::Refinery => "refinery",
            Self::Mayor => "mayor",
            Self::Witness => "witness",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for AgentRole {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "polecat" => Ok(Self::Polecat),
            "refinery" => Ok(Self::Refinery),
            "mayor" => Ok(Self::Mayor),
            "witness" => Ok(Self::Witness),
            _ => Err(unknown_value("agent role", s, &Self::ALL)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Blocked,
    Dead,
}

impl AgentStatus {
    pub const ALL: [&'static str; 4] = ["idle", "working", "blocked", "dead"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Blocked => "blocked",
            Self::Dead => "dead",
        }
    }

    #[must_use]
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::Dead)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for AgentStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "idle" => Ok(Self::Idle),
            "working" => Ok(Self::Working),
            "blocked" => Ok(Self::Blocked),
            "dead" => Ok(Self::Dead),
            _ => Err(unknown_value("agent status", s, &Self::ALL)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub rig_id: RigId,
    pub role: AgentRole,
    pub name: String,
    pub identity: String,
    pub status: AgentStatus,
    pub current_hook_bead_id: Option<BeadId>,
    pub dispatch_attempts: u32,
    pub last_activity_at: DateTime<Utc>,
    pub checkpoint: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Idle with a hook: the dispatch engine owes this agent a start.
    #[must_use]
    pub const fn awaits_dispatch(&self) -> bool {
        matches!(self.status, AgentStatus::Idle) && self.current_hook_bead_id.is_some()
    }

    /// Whether the heartbeat clock has run out at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_activity_at) > timeout
    }
}

/// Input for `registerAgent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgent {
    pub role: AgentRole,
    pub name: String,
    pub identity: String,
}

impl NewAgent {
    #[must_use]
    pub fn new(role: AgentRole, name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            identity: identity.into(),
        }
    }

    /// # Errors
    /// Returns `Validation` when name or identity is blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GastownError::Validation(
                "agent name must not be empty".to_string(),
            ));
        }
        if self.identity.trim().is_empty() {
            return Err(GastownError::Validation(
                "agent identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Filter for `listAgents`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFilter {
    pub status: Option<AgentStatus>,
    pub role: Option<AgentRole>,
}
