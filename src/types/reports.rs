use super::agent_types::{Agent, AgentStatus};
use super::bead_types::{Bead, BeadMetadata, BeadPriority};
use super::identifiers::{AgentId, BeadId};
use super::mail::MailMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispatchResult {
    /// The sandbox accepted the start; `status` is what it reported for the agent.
    Started { status: AgentStatus },
    /// Left idle and hooked; the next fire retries.
    Deferred { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub agent_id: AgentId,
    pub bead_id: BeadId,
    pub attempt: u32,
    #[serde(flatten)]
    pub result: DispatchResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub attempts: Vec<DispatchAttempt>,
}

impl DispatchReport {
    #[must_use]
    pub fn started(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| matches!(attempt.result, DispatchResult::Started { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MergeResult {
    Merged,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub entry_id: i64,
    pub bead_id: BeadId,
    pub branch: String,
    #[serde(flatten)]
    pub result: MergeResult,
}

/// Outcome of one liveness sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolReport {
    /// Every agent that is dead after the sweep.
    pub dead_agents: Vec<AgentId>,
    /// Beads unhooked by this sweep; already-unhooked beads are not repeated.
    pub orphaned_beads: Vec<BeadId>,
    /// Escalation beads filed by this sweep.
    pub escalations: Vec<BeadId>,
}

/// Everything one timer fire did, including swallowed engine failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireReport {
    pub dispatch: Option<DispatchReport>,
    pub merge: Option<MergeReport>,
    pub patrol: Option<PatrolReport>,
    pub errors: Vec<String>,
    pub activity: RigActivity,
    pub next_alarm: DateTime<Utc>,
}

/// Counts that drive the re-arm decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigActivity {
    pub idle_hooked_agents: u32,
    pub pending_reviews: u32,
    pub live_agents: u32,
}

impl RigActivity {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.idle_hooked_agents > 0 || self.pending_reviews > 0 || self.live_agents > 0
    }
}

/// Context bundle for an agent that is starting or resuming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeContext {
    pub agent: Agent,
    pub hooked_bead: Option<Bead>,
    pub undelivered_mail: Vec<MailMessage>,
    pub open_beads: Vec<Bead>,
}

/// Create an issue and hook it in one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlingRequest {
    pub title: String,
    pub body: Option<String>,
    pub priority: Option<BeadPriority>,
    pub labels: BTreeSet<String>,
    pub metadata: BeadMetadata,
    pub agent_id: Option<AgentId>,
}

impl SlingRequest {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlingResult {
    pub bead: Bead,
    pub agent: Agent,
    pub agent_created: bool,
}
