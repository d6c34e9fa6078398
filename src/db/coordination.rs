#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use super::agents::{attach_hook, fetch_agent, insert_agent};
use super::beads::{fetch_bead, insert_bead};
use super::mappers::{to_u32, AgentRow, AGENT_COLUMNS};
use super::{db_error, Conn, RigStore};
use crate::error::{GastownError, Result};
use crate::types::{
    Agent, AgentId, AgentRole, BeadFilter, BeadStatus, NewAgent, NewBead, PrimeContext, RigActivity, RigId,
    SlingRequest, SlingResult,
};
use chrono::Utc;
use tracing::info;

impl RigStore {
    /// Creates an issue and hooks it in one transaction. Picks the requested
    /// agent, else the oldest idle unhooked polecat, else registers a new one.
    ///
    /// # Errors
    /// Returns `Validation` for a bad bead, `NotFound` for an unknown agent
    /// and `Conflict` when the requested agent is dead or already hooked.
    pub async fn sling(&self, request: &SlingRequest) -> Result<SlingResult> {
        let new_bead = sling_bead(request);
        new_bead.validate()?;

        let mut tx = self.begin().await?;
        let now = Utc::now();
        let (agent, agent_created) = match &request.agent_id {
            Some(agent_id) => {
                let agent = fetch_agent(&mut tx, &self.rig_id, agent_id)
                    .await?
                    .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
                if !agent.status.is_alive() {
                    return Err(GastownError::Conflict(format!("agent {agent_id} is dead")));
                }
                if let Some(current) = &agent.current_hook_bead_id {
                    return Err(GastownError::Conflict(format!(
                        "agent {agent_id} already holds bead {current}"
                    )));
                }
                (agent, false)
            }
            None => match first_free_polecat(&mut tx, &self.rig_id).await? {
                Some(agent) => (agent, false),
                None => {
                    let ordinal = polecat_count(&mut tx, &self.rig_id).await? + 1;
                    let name = format!("polecat-{ordinal}");
                    let identity = format!("{name}@{}", self.rig_id);
                    let new_agent = NewAgent::new(AgentRole::Polecat, name, identity);
                    (insert_agent(&mut tx, &self.rig_id, &new_agent, now).await?, true)
                }
            },
        };

        let bead = insert_bead(&mut tx, &self.rig_id, &new_bead, now).await?;
        attach_hook(&mut tx, &self.rig_id, &agent.id, &bead.id, now).await?;
        let bead = fetch_bead(&mut tx, &self.rig_id, &bead.id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {}", bead.id)))?;
        let agent = fetch_agent(&mut tx, &self.rig_id, &agent.id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {}", agent.id)))?;
        tx.commit().await.map_err(db_error("commit sling"))?;

        info!(
            rig_id = %self.rig_id,
            bead_id = %bead.id,
            agent_id = %agent.id,
            agent_created,
            "Slung bead"
        );
        Ok(SlingResult {
            bead,
            agent,
            agent_created,
        })
    }

    /// Counts that drive the timer's re-arm decision.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn activity(&self) -> Result<RigActivity> {
        let (idle_hooked, queued, live) = sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT
                 (SELECT COUNT(*) FROM agents
                  WHERE rig_id = ?1 AND status = 'idle' AND current_hook_bead_id IS NOT NULL),
                 (SELECT COUNT(*) FROM review_queue
                  WHERE rig_id = ?2 AND status IN ('pending', 'merging')),
                 (SELECT COUNT(*) FROM agents WHERE rig_id = ?3 AND status <> 'dead')",
        )
        .bind(self.rig_id.value())
        .bind(self.rig_id.value())
        .bind(self.rig_id.value())
        .fetch_one(self.pool())
        .await
        .map_err(db_error("count rig activity"))?;

        Ok(RigActivity {
            idle_hooked_agents: to_u32(idle_hooked),
            pending_reviews: to_u32(queued),
            live_agents: to_u32(live),
        })
    }

    /// Read-only context for an agent that is starting or resuming.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown agent.
    pub async fn prime_context(&self, agent_id: &AgentId) -> Result<PrimeContext> {
        let agent = self.require_agent(agent_id).await?;
        let hooked_bead = match &agent.current_hook_bead_id {
            Some(bead_id) => self.get_bead(bead_id).await?,
            None => None,
        };
        let undelivered_mail = self.peek_mail(agent_id).await?;
        let open_beads = self
            .list_beads(&BeadFilter::default().with_status(BeadStatus::Open))
            .await?;

        Ok(PrimeContext {
            agent,
            hooked_bead,
            undelivered_mail,
            open_beads,
        })
    }
}

fn sling_bead(request: &SlingRequest) -> NewBead {
    let mut bead = NewBead::issue(request.title.clone());
    bead.body.clone_from(&request.body);
    bead.priority = request.priority;
    bead.labels.clone_from(&request.labels);
    bead.metadata.clone_from(&request.metadata);
    bead
}

async fn first_free_polecat(conn: &mut Conn, rig_id: &RigId) -> Result<Option<Agent>> {
    let sql = format!(
        "SELECT {AGENT_COLUMNS} FROM agents
         WHERE rig_id = ?1 AND role = 'polecat' AND status = 'idle' AND current_hook_bead_id IS NULL
         ORDER BY rowid LIMIT 1"
    );
    sqlx::query_as::<_, AgentRow>(&sql)
        .bind(rig_id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find free polecat"))?
        .map(AgentRow::into_agent)
        .transpose()
}

async fn polecat_count(conn: &mut Conn, rig_id: &RigId) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM agents WHERE rig_id = ?1 AND role = 'polecat'",
    )
    .bind(rig_id.value())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("count polecats"))
}
