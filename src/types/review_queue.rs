#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

use super::identifiers::{AgentId, BeadId, RigId};
use super::unknown_value;
use crate::error::{GastownError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Merging,
    Merged,
    Failed,
}

impl ReviewStatus {
    pub const ALL: [&'static str; 4] = ["pending", "merging", "merged", "failed"];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Merging => "merging",
            Self::Merged => "merged",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Failed)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ReviewStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pending" => Ok(Self::Pending),
            "merging" => Ok(Self::Merging),
            "merged" => Ok(Self::Merged),
            "failed" => Ok(Self::Failed),
            _ => Err(unknown_value("review status", s, &Self::ALL)),
        }
    }
}

/// A "ready to merge" submission, drained FIFO by the merge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub id: i64,
    pub rig_id: RigId,
    pub agent_id: AgentId,
    pub bead_id: BeadId,
    pub branch: String,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
    pub status: ReviewStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReviewEntry {
    pub agent_id: AgentId,
    pub bead_id: BeadId,
    pub branch: String,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
}

impl NewReviewEntry {
    #[must_use]
    pub fn new(agent_id: AgentId, bead_id: BeadId, branch: impl Into<String>) -> Self {
        Self {
            agent_id,
            bead_id,
            branch: branch.into(),
            pr_url: None,
            summary: None,
        }
    }

    #[must_use]
    pub fn with_pr_url(mut self, pr_url: Option<String>) -> Self {
        self.pr_url = pr_url;
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary;
        self
    }

    /// # Errors
    /// Returns `Validation` when the branch name is blank or contains whitespace.
    pub fn validate(&self) -> Result<()> {
        validate_branch(&self.branch)
    }
}

/// # Errors
/// Returns `Validation` when the branch name is blank or contains whitespace.
pub(crate) fn validate_branch(branch: &str) -> Result<()> {
    if branch.trim().is_empty() {
        return Err(GastownError::Validation(
            "branch must not be empty".to_string(),
        ));
    }
    if branch.chars().any(char::is_whitespace) {
        return Err(GastownError::Validation(format!(
            "branch '{branch}' must not contain whitespace"
        )));
    }
    Ok(())
}
