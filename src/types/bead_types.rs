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
use std::collections::BTreeSet;
use std::fmt;

/// Opaque key/value map attached to a bead.
pub type BeadMetadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key naming the agent an escalation concerns.
pub const SOURCE_AGENT_KEY: &str = "source_agent_id";
/// Metadata key naming the bead an escalation concerns.
pub const SOURCE_BEAD_KEY: &str = "source_bead_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadType {
    Issue,
    Message,
    Escalation,
    MergeRequest,
}

impl BeadType {
    pub const ALL: [&'static str; 4] = ["issue", "message", "escalation", "merge_request"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Message => "message",
            Self::Escalation => "escalation",
            Self::MergeRequest => "merge_request",
        }
    }
}

impl fmt::Display for BeadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BeadType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "issue" => Ok(Self::Issue),
            "message" => Ok(Self::Message),
            "escalation" => Ok(Self::Escalation),
            "merge_request" => Ok(Self::MergeRequest),
            _ => Err(unknown_value("bead type", s, &Self::ALL)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Closed,
    Failed,
}

impl BeadStatus {
    pub const ALL: [&'static str; 4] = ["open", "in_progress", "closed", "failed"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    /// Closed and failed beads accept no further status writes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for BeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BeadStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            "failed" => Ok(Self::Failed),
            _ => Err(unknown_value("bead status", s, &Self::ALL)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl BeadPriority {
    pub const ALL: [&'static str; 4] = ["low", "medium", "high", "critical"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for BeadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BeadPriority {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(unknown_value("bead priority", s, &Self::ALL)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    pub id: BeadId,
    pub rig_id: RigId,
    #[serde(rename = "type")]
    pub bead_type: BeadType,
    pub status: BeadStatus,
    pub title: String,
    pub body: Option<String>,
    pub assignee_agent_id: Option<AgentId>,
    pub convoy_id: Option<String>,
    pub priority: BeadPriority,
    pub labels: BTreeSet<String>,
    pub metadata: BeadMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Bead {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this escalation was filed about `agent_id` working on `bead_id`.
    #[must_use]
    pub fn concerns(&self, agent_id: &AgentId, bead_id: &BeadId) -> bool {
        let matches = |key: &str, expected: &str| {
            self.metadata
                .get(key)
                .and_then(serde_json::Value::as_str)
                .is_some_and(|value| value == expected)
        };
        matches(SOURCE_AGENT_KEY, agent_id.value()) && matches(SOURCE_BEAD_KEY, bead_id.value())
    }
}

/// Input for `createBead`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBead {
    pub bead_type: BeadType,
    pub title: String,
    pub body: Option<String>,
    pub priority: Option<BeadPriority>,
    pub labels: BTreeSet<String>,
    pub metadata: BeadMetadata,
    pub assignee: Option<AgentId>,
    pub convoy_id: Option<String>,
}

impl NewBead {
    #[must_use]
    pub fn new(bead_type: BeadType, title: impl Into<String>) -> Self {
        Self {
            bead_type,
            title: title.into(),
            body: None,
            priority: None,
            labels: BTreeSet::new(),
            metadata: BeadMetadata::new(),
            assignee: None,
            convoy_id: None,
        }
    }

    #[must_use]
    pub fn issue(title: impl Into<String>) -> Self {
        Self::new(BeadType::Issue, title)
    }

    /// Escalations default to `high` priority.
    #[must_use]
    pub fn escalation(title: impl Into<String>) -> Self {
        Self::new(BeadType::Escalation, title).with_priority(BeadPriority::High)
    }

    /// Record the agent and bead an escalation is about.
    #[must_use]
    pub fn with_source(mut self, agent_id: Option<&AgentId>, bead_id: Option<&BeadId>) -> Self {
        if let Some(agent_id) = agent_id {
            self.metadata.insert(
                SOURCE_AGENT_KEY.to_string(),
                serde_json::Value::String(agent_id.value().to_string()),
            );
        }
        if let Some(bead_id) = bead_id {
            self.metadata.insert(
                SOURCE_BEAD_KEY.to_string(),
                serde_json::Value::String(bead_id.value().to_string()),
            );
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: BeadPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_convoy(mut self, convoy_id: impl Into<String>) -> Self {
        self.convoy_id = Some(convoy_id.into());
        self
    }

    /// # Errors
    /// Returns `Validation` for an empty title or a blank label.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(GastownError::Validation(
                "bead title must not be empty".to_string(),
            ));
        }
        if self.labels.iter().any(|label| label.trim().is_empty()) {
            return Err(GastownError::Validation(
                "bead labels must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Caller-filed escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub priority: Option<BeadPriority>,
    #[serde(default)]
    pub source_agent_id: Option<AgentId>,
    #[serde(default)]
    pub source_bead_id: Option<BeadId>,
}

impl EscalationRequest {
    #[must_use]
    pub fn into_new_bead(self) -> NewBead {
        let mut bead = NewBead::escalation(self.title)
            .with_source(self.source_agent_id.as_ref(), self.source_bead_id.as_ref());
        bead.body = self.body;
        if let Some(priority) = self.priority {
            bead.priority = Some(priority);
        }
        bead
    }
}

/// Filter for `listBeads`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadFilter {
    pub status: Option<BeadStatus>,
    pub bead_type: Option<BeadType>,
    pub assignee: Option<AgentId>,
    pub convoy_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl BeadFilter {
    #[must_use]
    pub const fn with_status(mut self, status: BeadStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_type(mut self, bead_type: BeadType) -> Self {
        self.bead_type = Some(bead_type);
        self
    }
}
