use crate::error::{GastownError, Result};
use crate::types::{
    Agent, AgentId, AgentRole, AgentStatus, Bead, BeadId, BeadPriority, BeadStatus, BeadType,
    MailMessage, ReviewEntry, ReviewStatus, Rig, RigId, Town, TownId,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::BTreeSet;

pub const TOWN_COLUMNS: &str = "id, name, owner, created_at, updated_at";
pub const RIG_COLUMNS: &str =
    "id, town_id, name, git_url, default_branch, created_at, updated_at";
pub const BEAD_COLUMNS: &str = "id, rig_id, bead_type, status, title, body, assignee_agent_id, \
     convoy_id, priority, labels, metadata, created_at, updated_at, closed_at";
pub const AGENT_COLUMNS: &str = "id, rig_id, role, name, identity, status, current_hook_bead_id, \
     dispatch_attempts, last_activity_at, checkpoint, created_at";
pub const MAIL_COLUMNS: &str = "id, rig_id, from_agent_id, to_agent_id, subject, body, delivered, \
     created_at, delivered_at";
pub const REVIEW_COLUMNS: &str = "id, rig_id, agent_id, bead_id, branch, pr_url, summary, status, \
     failure_reason, created_at, updated_at";

#[derive(Debug, FromRow)]
pub struct TownRow {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TownRow> for Town {
    fn from(row: TownRow) -> Self {
        Self {
            id: TownId::new(row.id),
            name: row.name,
            owner: row.owner,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct RigRow {
    pub id: String,
    pub town_id: String,
    pub name: String,
    pub git_url: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RigRow> for Rig {
    fn from(row: RigRow) -> Self {
        Self {
            id: RigId::new(row.id),
            town_id: TownId::new(row.town_id),
            name: row.name,
            git_url: row.git_url,
            default_branch: row.default_branch,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct BeadRow {
    pub id: String,
    pub rig_id: String,
    pub bead_type: String,
    pub status: String,
    pub title: String,
    pub body: Option<String>,
    pub assignee_agent_id: Option<String>,
    pub convoy_id: Option<String>,
    pub priority: String,
    pub labels: String,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl BeadRow {
    pub fn into_bead(self) -> Result<Bead> {
        let bead_type =
            BeadType::try_from(self.bead_type.as_str()).map_err(GastownError::DatabaseError)?;
        let status = BeadStatus::try_from(self.status.as_str()).map_err(GastownError::DatabaseError)?;
        let priority =
            BeadPriority::try_from(self.priority.as_str()).map_err(GastownError::DatabaseError)?;
        let labels = serde_json::from_str::<BTreeSet<String>>(&self.labels)?;
        let metadata = serde_json::from_str(&self.metadata)?;

        Ok(Bead {
            id: BeadId::new(self.id),
            rig_id: RigId::new(self.rig_id),
            bead_type,
            status,
            title: self.title,
            body: self.body,
            assignee_agent_id: self.assignee_agent_id.map(AgentId::new),
            convoy_id: self.convoy_id,
            priority,
            labels,
            metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AgentRow {
    pub id: String,
    pub rig_id: String,
    pub role: String,
    pub name: String,
    pub identity: String,
    pub status: String,
    pub current_hook_bead_id: Option<String>,
    pub dispatch_attempts: i64,
    pub last_activity_at: DateTime<Utc>,
    pub checkpoint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AgentRow {
    pub fn into_agent(self) -> Result<Agent> {
        let role = AgentRole::try_from(self.role.as_str()).map_err(GastownError::DatabaseError)?;
        let status =
            AgentStatus::try_from(self.status.as_str()).map_err(GastownError::DatabaseError)?;
        let checkpoint = self
            .checkpoint
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;

        Ok(Agent {
            id: AgentId::new(self.id),
            rig_id: RigId::new(self.rig_id),
            role,
            name: self.name,
            identity: self.identity,
            status,
            current_hook_bead_id: self.current_hook_bead_id.map(BeadId::new),
            dispatch_attempts: to_u32(self.dispatch_attempts),
            last_activity_at: self.last_activity_at,
            checkpoint,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct MailRow {
    pub id: i64,
    pub rig_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub subject: String,
    pub body: String,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<MailRow> for MailMessage {
    fn from(row: MailRow) -> Self {
        Self {
            id: row.id,
            rig_id: RigId::new(row.rig_id),
            from_agent_id: AgentId::new(row.from_agent_id),
            to_agent_id: AgentId::new(row.to_agent_id),
            subject: row.subject,
            body: row.body,
            delivered: row.delivered,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub rig_id: String,
    pub agent_id: String,
    pub bead_id: String,
    pub branch: String,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewRow {
    pub fn into_entry(self) -> Result<ReviewEntry> {
        let status =
            ReviewStatus::try_from(self.status.as_str()).map_err(GastownError::DatabaseError)?;
        Ok(ReviewEntry {
            id: self.id,
            rig_id: RigId::new(self.rig_id),
            agent_id: AgentId::new(self.agent_id),
            bead_id: BeadId::new(self.bead_id),
            branch: self.branch,
            pr_url: self.pr_url,
            summary: self.summary,
            status,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
