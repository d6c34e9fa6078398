#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use super::beads::{assign_in_progress, clear_assignee, fetch_bead};
use super::mappers::{AgentRow, AGENT_COLUMNS};
use super::{db_error, Conn, RigStore};
use crate::error::{GastownError, Result};
use crate::types::{
    Agent, AgentFilter, AgentId, AgentStatus, Bead, BeadId, NewAgent, RigId,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info, warn};

impl RigStore {
    /// Inserts an `idle` agent with no hook.
    ///
    /// # Errors
    /// Returns `Validation` for a blank name or identity.
    pub async fn register_agent(&self, new_agent: &NewAgent) -> Result<Agent> {
        new_agent.validate()?;
        let mut conn = self.acquire().await?;
        let agent = insert_agent(&mut conn, &self.rig_id, new_agent, Utc::now()).await?;
        info!(rig_id = %self.rig_id, agent_id = %agent.id, role = %agent.role, "Agent registered");
        Ok(agent)
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        let mut conn = self.acquire().await?;
        fetch_agent(&mut conn, &self.rig_id, agent_id).await
    }

    /// # Errors
    /// Returns `NotFound` when the agent does not exist in this rig.
    pub async fn require_agent(&self, agent_id: &AgentId) -> Result<Agent> {
        self.get_agent(agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))
    }

    /// Agents in registration order.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE rig_id = "
        ));
        builder.push_bind(self.rig_id.value());
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(role) = filter.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }
        builder.push(" ORDER BY rowid");

        let rows = builder
            .build_query_as::<AgentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(db_error("list agents"))?;
        rows.into_iter().map(AgentRow::into_agent).collect()
    }

    /// Links `agent_id` and `bead_id` exclusively and moves the bead to
    /// `in_progress`. Resets the agent's dispatch counter.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown ids and `Conflict` when the agent is
    /// dead or already hooked, or the bead is terminal or held by another agent.
    pub async fn hook_bead(&self, agent_id: &AgentId, bead_id: &BeadId) -> Result<Bead> {
        let mut tx = self.begin().await?;
        let agent = fetch_agent(&mut tx, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
        let bead = fetch_bead(&mut tx, &self.rig_id, bead_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {bead_id}")))?;

        ensure_hookable(&mut tx, &self.rig_id, &agent, &bead).await?;
        let now = Utc::now();
        attach_hook(&mut tx, &self.rig_id, agent_id, bead_id, now).await?;
        let hooked = fetch_bead(&mut tx, &self.rig_id, bead_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {bead_id}")))?;
        tx.commit().await.map_err(db_error("commit hook"))?;

        info!(rig_id = %self.rig_id, agent_id = %agent_id, bead_id = %bead_id, "Bead hooked");
        Ok(hooked)
    }

    /// Clears the agent's hook and the bead's assignee; bead status is untouched.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn unhook_bead(&self, agent_id: &AgentId) -> Result<Agent> {
        let mut tx = self.begin().await?;
        let agent = fetch_agent(&mut tx, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
        let released = detach_hook(&mut tx, &self.rig_id, &agent, Utc::now()).await?;
        let updated = fetch_agent(&mut tx, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
        tx.commit().await.map_err(db_error("commit unhook"))?;

        if let Some(bead_id) = released {
            info!(rig_id = %self.rig_id, agent_id = %agent_id, bead_id = %bead_id, "Bead unhooked");
        }
        Ok(updated)
    }

    /// Records liveness. Unknown agents are ignored. A dead agent that
    /// heartbeats is revived as `idle`; an idle hooked agent becomes `working`.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn touch_heartbeat(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        let mut tx = self.begin().await?;
        let Some(agent) = fetch_agent(&mut tx, &self.rig_id, agent_id).await? else {
            debug!(rig_id = %self.rig_id, agent_id = %agent_id, "Heartbeat from unknown agent ignored");
            return Ok(None);
        };

        let status = match agent.status {
            AgentStatus::Dead => AgentStatus::Idle,
            AgentStatus::Idle if agent.current_hook_bead_id.is_some() => AgentStatus::Working,
            other => other,
        };
        sqlx::query(
            "UPDATE agents SET status = ?1, last_activity_at = ?2 WHERE rig_id = ?3 AND id = ?4",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(self.rig_id.value())
        .bind(agent_id.value())
        .execute(&mut *tx)
        .await
        .map_err(db_error("record heartbeat"))?;
        let updated = fetch_agent(&mut tx, &self.rig_id, agent_id).await?;
        tx.commit().await.map_err(db_error("commit heartbeat"))?;

        if agent.status != status {
            info!(rig_id = %self.rig_id, agent_id = %agent_id, from = %agent.status, to = %status, "Agent status changed by heartbeat");
        }
        Ok(updated)
    }

    /// Bumps the dispatch counter before a start attempt; returns the new count.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn record_dispatch_attempt(&self, agent_id: &AgentId) -> Result<u32> {
        let mut conn = self.acquire().await?;
        let updated = sqlx::query(
            "UPDATE agents SET dispatch_attempts = dispatch_attempts + 1
             WHERE rig_id = ?1 AND id = ?2",
        )
        .bind(self.rig_id.value())
        .bind(agent_id.value())
        .execute(&mut *conn)
        .await
        .map_err(db_error("record dispatch attempt"))?;
        if updated.rows_affected() == 0 {
            return Err(GastownError::NotFound(format!("agent {agent_id}")));
        }

        fetch_agent(&mut conn, &self.rig_id, agent_id)
            .await?
            .map(|agent| agent.dispatch_attempts)
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))
    }

    /// Applies the status a sandbox reported after a successful start, but
    /// only if the agent is still idle and hooked.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn apply_dispatch_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<bool> {
        if matches!(status, AgentStatus::Idle | AgentStatus::Dead) {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE agents SET status = ?1, last_activity_at = ?2
             WHERE rig_id = ?3 AND id = ?4 AND status = 'idle' AND current_hook_bead_id IS NOT NULL",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(self.rig_id.value())
        .bind(agent_id.value())
        .execute(self.pool())
        .await
        .map(|result| result.rows_affected() > 0)
        .map_err(db_error("apply dispatch status"))
    }

    /// Unhooks and then marks the agent dead in one transaction. Returns the
    /// bead that was released, if any.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn retire_agent(&self, agent_id: &AgentId) -> Result<Option<BeadId>> {
        let mut tx = self.begin().await?;
        let Some(agent) = fetch_agent(&mut tx, &self.rig_id, agent_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let released = detach_hook(&mut tx, &self.rig_id, &agent, now).await?;
        sqlx::query("UPDATE agents SET status = 'dead' WHERE rig_id = ?1 AND id = ?2")
            .bind(self.rig_id.value())
            .bind(agent_id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_error("mark agent dead"))?;
        tx.commit().await.map_err(db_error("commit agent retirement"))?;

        if agent.status.is_alive() {
            warn!(rig_id = %self.rig_id, agent_id = %agent_id, "Agent marked dead");
        }
        Ok(released)
    }

    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn write_checkpoint(
        &self,
        agent_id: &AgentId,
        checkpoint: &serde_json::Value,
    ) -> Result<Agent> {
        let mut conn = self.acquire().await?;
        let updated = sqlx::query("UPDATE agents SET checkpoint = ?1 WHERE rig_id = ?2 AND id = ?3")
            .bind(serde_json::to_string(checkpoint)?)
            .bind(self.rig_id.value())
            .bind(agent_id.value())
            .execute(&mut *conn)
            .await
            .map_err(db_error("write checkpoint"))?;
        if updated.rows_affected() == 0 {
            return Err(GastownError::NotFound(format!("agent {agent_id}")));
        }
        fetch_agent(&mut conn, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))
    }

    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn read_checkpoint(&self, agent_id: &AgentId) -> Result<Option<serde_json::Value>> {
        self.require_agent(agent_id)
            .await
            .map(|agent| agent.checkpoint)
    }

    /// Unhooks, then deletes the agent. Mail addressed to it goes with it.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn delete_agent(&self, agent_id: &AgentId) -> Result<Option<BeadId>> {
        let mut tx = self.begin().await?;
        let agent = fetch_agent(&mut tx, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
        let released = detach_hook(&mut tx, &self.rig_id, &agent, Utc::now()).await?;
        sqlx::query("DELETE FROM agents WHERE rig_id = ?1 AND id = ?2")
            .bind(self.rig_id.value())
            .bind(agent_id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete agent"))?;
        tx.commit().await.map_err(db_error("commit agent delete"))?;

        info!(rig_id = %self.rig_id, agent_id = %agent_id, released_bead = ?released.as_ref().map(BeadId::value), "Agent deleted");
        Ok(released)
    }
}

pub(super) async fn fetch_agent(
    conn: &mut Conn,
    rig_id: &RigId,
    agent_id: &AgentId,
) -> Result<Option<Agent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE rig_id = ?1 AND id = ?2");
    sqlx::query_as::<_, AgentRow>(&sql)
        .bind(rig_id.value())
        .bind(agent_id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("load agent"))?
        .map(AgentRow::into_agent)
        .transpose()
}

pub(super) async fn insert_agent(
    conn: &mut Conn,
    rig_id: &RigId,
    new_agent: &NewAgent,
    now: DateTime<Utc>,
) -> Result<Agent> {
    let agent = Agent {
        id: AgentId::generate(),
        rig_id: rig_id.clone(),
        role: new_agent.role,
        name: new_agent.name.trim().to_string(),
        identity: new_agent.identity.trim().to_string(),
        status: AgentStatus::Idle,
        current_hook_bead_id: None,
        dispatch_attempts: 0,
        last_activity_at: now,
        checkpoint: None,
        created_at: now,
    };

    sqlx::query(
        "INSERT INTO agents (id, rig_id, role, name, identity, status, current_hook_bead_id,
             dispatch_attempts, last_activity_at, checkpoint, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'idle', NULL, 0, ?6, NULL, ?7)",
    )
    .bind(agent.id.value())
    .bind(rig_id.value())
    .bind(agent.role.as_str())
    .bind(&agent.name)
    .bind(&agent.identity)
    .bind(agent.last_activity_at)
    .bind(agent.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error("insert agent"))?;

    Ok(agent)
}

pub(super) async fn fetch_hook_holder(
    conn: &mut Conn,
    rig_id: &RigId,
    bead_id: &BeadId,
) -> Result<Option<AgentId>> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM agents WHERE rig_id = ?1 AND current_hook_bead_id = ?2",
    )
    .bind(rig_id.value())
    .bind(bead_id.value())
    .fetch_optional(&mut *conn)
    .await
    .map(|id| id.map(AgentId::new))
    .map_err(db_error("load hook holder"))
}

pub(super) async fn ensure_hookable(
    conn: &mut Conn,
    rig_id: &RigId,
    agent: &Agent,
    bead: &Bead,
) -> Result<()> {
    if !agent.status.is_alive() {
        return Err(GastownError::Conflict(format!("agent {} is dead", agent.id)));
    }
    if let Some(current) = &agent.current_hook_bead_id {
        return Err(GastownError::Conflict(format!(
            "agent {} already holds bead {current}",
            agent.id
        )));
    }
    if bead.is_terminal() {
        return Err(GastownError::Conflict(format!(
            "bead {} is already {}",
            bead.id, bead.status
        )));
    }
    if let Some(holder) = fetch_hook_holder(conn, rig_id, &bead.id).await? {
        return Err(GastownError::Conflict(format!(
            "bead {} is already hooked by agent {holder}",
            bead.id
        )));
    }
    Ok(())
}

/// Hook write shared by `hook_bead` and `sling`. The agent is left `idle`
/// so the next dispatch pass starts it.
pub(super) async fn attach_hook(
    conn: &mut Conn,
    rig_id: &RigId,
    agent_id: &AgentId,
    bead_id: &BeadId,
    now: DateTime<Utc>,
) -> Result<()> {
    assign_in_progress(conn, rig_id, bead_id, agent_id, now).await?;
    sqlx::query(
        "UPDATE agents SET current_hook_bead_id = ?1, dispatch_attempts = 0, status = 'idle',
             last_activity_at = ?2
         WHERE rig_id = ?3 AND id = ?4",
    )
    .bind(bead_id.value())
    .bind(now)
    .bind(rig_id.value())
    .bind(agent_id.value())
    .execute(&mut *conn)
    .await
    .map_err(db_error("hook bead"))
    .map(|_result| ())
}

/// Clears `agent`'s hook and, when it is still the assignee, the bead's
/// assignee. Live agents return to `idle`.
pub(super) async fn detach_hook(
    conn: &mut Conn,
    rig_id: &RigId,
    agent: &Agent,
    now: DateTime<Utc>,
) -> Result<Option<BeadId>> {
    let Some(bead_id) = agent.current_hook_bead_id.clone() else {
        return Ok(None);
    };

    if let Some(bead) = fetch_bead(conn, rig_id, &bead_id).await? {
        if bead.assignee_agent_id.as_ref() == Some(&agent.id) {
            clear_assignee(conn, rig_id, &bead_id, now).await?;
        }
    }
    clear_agent_hook(conn, rig_id, &agent.id).await?;
    Ok(Some(bead_id))
}

/// Releases whichever agent holds `bead_id`, leaving the bead's assignee as
/// recorded. Returns the released agent.
pub(super) async fn release_hook_holder(
    conn: &mut Conn,
    rig_id: &RigId,
    bead_id: &BeadId,
) -> Result<Option<AgentId>> {
    let Some(holder) = fetch_hook_holder(conn, rig_id, bead_id).await? else {
        return Ok(None);
    };
    clear_agent_hook(conn, rig_id, &holder).await?;
    Ok(Some(holder))
}

async fn clear_agent_hook(conn: &mut Conn, rig_id: &RigId, agent_id: &AgentId) -> Result<()> {
    sqlx::query(
        "UPDATE agents SET current_hook_bead_id = NULL,
             status = CASE WHEN status = 'dead' THEN 'dead' ELSE 'idle' END
         WHERE rig_id = ?1 AND id = ?2",
    )
    .bind(rig_id.value())
    .bind(agent_id.value())
    .execute(&mut *conn)
    .await
    .map_err(db_error("clear agent hook"))
    .map(|_result| ())
}
