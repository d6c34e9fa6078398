use super::identifiers::{AgentId, RigId};
use crate::error::{GastownError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-to-point message held in the recipient's inbox.
///
/// Reading marks the message delivered; delivered mail is retained for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: i64,
    pub rig_id: RigId,
    pub from_agent_id: AgentId,
    pub to_agent_id: AgentId,
    pub subject: String,
    pub body: String,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMail {
    pub from: AgentId,
    pub to: AgentId,
    pub subject: String,
    pub body: String,
}

impl NewMail {
    #[must_use]
    pub fn new(
        from: AgentId,
        to: AgentId,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to,
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// # Errors
    /// Returns `Validation` when the subject is blank.
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(GastownError::Validation(
                "mail subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
