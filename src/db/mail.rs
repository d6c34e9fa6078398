use super::agents::fetch_agent;
use super::mappers::{MailRow, MAIL_COLUMNS};
use super::{db_error, RigStore};
use crate::error::{GastownError, Result};
use crate::types::{AgentId, MailMessage, NewMail};
use chrono::Utc;
use tracing::debug;

impl RigStore {
    /// # Errors
    /// Returns `Validation` for a blank subject and `NotFound` when either
    /// agent is unknown.
    pub async fn send_mail(&self, mail: &NewMail) -> Result<MailMessage> {
        mail.validate()?;
        let mut tx = self.begin().await?;
        for agent_id in [&mail.from, &mail.to] {
            fetch_agent(&mut tx, &self.rig_id, agent_id)
                .await?
                .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
        }

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO mail (rig_id, from_agent_id, to_agent_id, subject, body, delivered, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(self.rig_id.value())
        .bind(mail.from.value())
        .bind(mail.to.value())
        .bind(&mail.subject)
        .bind(&mail.body)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error("send mail"))?
        .last_insert_rowid();
        tx.commit().await.map_err(db_error("commit mail"))?;

        debug!(rig_id = %self.rig_id, mail_id = id, from = %mail.from, to = %mail.to, "Mail queued");
        Ok(MailMessage {
            id,
            rig_id: self.rig_id.clone(),
            from_agent_id: mail.from.clone(),
            to_agent_id: mail.to.clone(),
            subject: mail.subject.clone(),
            body: mail.body.clone(),
            delivered: false,
            created_at: now,
            delivered_at: None,
        })
    }

    /// Drains the inbox: returns undelivered mail oldest first and marks it
    /// delivered. Delivered mail is kept.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn check_mail(&self, agent_id: &AgentId) -> Result<Vec<MailMessage>> {
        let mut tx = self.begin().await?;
        fetch_agent(&mut tx, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;

        let sql = format!(
            "SELECT {MAIL_COLUMNS} FROM mail
             WHERE rig_id = ?1 AND to_agent_id = ?2 AND delivered = 0
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, MailRow>(&sql)
            .bind(self.rig_id.value())
            .bind(agent_id.value())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error("load mail"))?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let last_id = rows.iter().map(|row| row.id).max().unwrap_or_default();
        sqlx::query(
            "UPDATE mail SET delivered = 1, delivered_at = ?1
             WHERE rig_id = ?2 AND to_agent_id = ?3 AND delivered = 0 AND id <= ?4",
        )
        .bind(now)
        .bind(self.rig_id.value())
        .bind(agent_id.value())
        .bind(last_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("mark mail delivered"))?;
        tx.commit().await.map_err(db_error("commit mail delivery"))?;

        Ok(rows
            .into_iter()
            .map(MailMessage::from)
            .map(|message| MailMessage {
                delivered: true,
                delivered_at: Some(now),
                ..message
            })
            .collect())
    }

    /// Undelivered mail without marking it delivered.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn peek_mail(&self, agent_id: &AgentId) -> Result<Vec<MailMessage>> {
        let sql = format!(
            "SELECT {MAIL_COLUMNS} FROM mail
             WHERE rig_id = ?1 AND to_agent_id = ?2 AND delivered = 0
             ORDER BY id"
        );
        sqlx::query_as::<_, MailRow>(&sql)
            .bind(self.rig_id.value())
            .bind(agent_id.value())
            .fetch_all(self.pool())
            .await
            .map(|rows| rows.into_iter().map(MailMessage::from).collect())
            .map_err(db_error("peek mail"))
    }
}
