#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use super::agents::{fetch_agent, release_hook_holder};
use super::mappers::{BeadRow, BEAD_COLUMNS};
use super::{db_error, Conn, RigStore};
use crate::error::{GastownError, Result};
use crate::types::{AgentId, Bead, BeadFilter, BeadId, BeadStatus, BeadType, NewBead, RigId};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

impl RigStore {
    /// Inserts a bead with status `open`.
    ///
    /// # Errors
    /// Returns `Validation` for bad input and `NotFound` for an unknown assignee.
    pub async fn create_bead(&self, new_bead: &NewBead) -> Result<Bead> {
        new_bead.validate()?;
        let mut tx = self.begin().await?;
        if let Some(assignee) = &new_bead.assignee {
            fetch_agent(&mut tx, &self.rig_id, assignee)
                .await?
                .ok_or_else(|| GastownError::NotFound(format!("agent {assignee}")))?;
        }
        let bead = insert_bead(&mut tx, &self.rig_id, new_bead, Utc::now()).await?;
        tx.commit().await.map_err(db_error("commit bead"))?;

        info!(rig_id = %self.rig_id, bead_id = %bead.id, bead_type = %bead.bead_type, "Bead created");
        Ok(bead)
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn get_bead(&self, bead_id: &BeadId) -> Result<Option<Bead>> {
        let mut conn = self.acquire().await?;
        fetch_bead(&mut conn, &self.rig_id, bead_id).await
    }

    /// # Errors
    /// Returns `NotFound` when the bead does not exist in this rig.
    pub async fn require_bead(&self, bead_id: &BeadId) -> Result<Bead> {
        self.get_bead(bead_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {bead_id}")))
    }

    /// Beads in creation order, narrowed by `filter`.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn list_beads(&self, filter: &BeadFilter) -> Result<Vec<Bead>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {BEAD_COLUMNS} FROM beads WHERE rig_id = "));
        builder.push_bind(self.rig_id.value());
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(bead_type) = filter.bead_type {
            builder.push(" AND bead_type = ").push_bind(bead_type.as_str());
        }
        if let Some(assignee) = &filter.assignee {
            builder
                .push(" AND assignee_agent_id = ")
                .push_bind(assignee.value());
        }
        if let Some(convoy_id) = &filter.convoy_id {
            builder.push(" AND convoy_id = ").push_bind(convoy_id.as_str());
        }
        builder.push(" ORDER BY rowid");
        if filter.limit.is_some() || filter.offset.is_some() {
            builder
                .push(" LIMIT ")
                .push_bind(filter.limit.map_or(-1, i64::from));
            builder
                .push(" OFFSET ")
                .push_bind(i64::from(filter.offset.unwrap_or(0)));
        }

        let rows = builder
            .build_query_as::<BeadRow>()
            .fetch_all(self.pool())
            .await
            .map_err(db_error("list beads"))?;
        rows.into_iter().map(BeadRow::into_bead).collect()
    }

    /// Overwrites the status of a non-terminal bead.
    ///
    /// Writing the status a terminal bead already has is a successful no-op.
    /// `in_progress` is reachable only through a hook. Leaving `in_progress`
    /// releases the agent holding the hook, and reopening also clears the
    /// assignee.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown bead and `Conflict` for a write to a
    /// terminal bead or an unhooked move into `in_progress`.
    pub async fn update_bead_status(
        &self,
        bead_id: &BeadId,
        status: BeadStatus,
        acting_agent_id: Option<&AgentId>,
    ) -> Result<Bead> {
        let mut tx = self.begin().await?;
        let bead = fetch_bead(&mut tx, &self.rig_id, bead_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {bead_id}")))?;

        if bead.status == status {
            return Ok(bead);
        }
        if bead.status.is_terminal() {
            return Err(GastownError::Conflict(format!(
                "bead {bead_id} is already {}",
                bead.status
            )));
        }
        if status == BeadStatus::InProgress {
            return Err(GastownError::Conflict(format!(
                "bead {bead_id} can only become in_progress by being hooked"
            )));
        }

        let now = Utc::now();
        let released = release_hook_holder(&mut tx, &self.rig_id, bead_id).await?;
        write_bead_status(&mut tx, &self.rig_id, bead_id, status, now).await?;
        if status == BeadStatus::Open {
            clear_assignee(&mut tx, &self.rig_id, bead_id, now).await?;
        }
        let updated = fetch_bead(&mut tx, &self.rig_id, bead_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {bead_id}")))?;
        tx.commit().await.map_err(db_error("commit bead status"))?;

        info!(
            rig_id = %self.rig_id,
            bead_id = %bead_id,
            from = %bead.status,
            to = %status,
            acting_agent_id = ?acting_agent_id.map(AgentId::value),
            released_agent_id = ?released.as_ref().map(AgentId::value),
            "Bead status updated"
        );
        Ok(updated)
    }

    /// Closes a bead; closing a closed bead succeeds without changes.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown bead and `Conflict` when it already failed.
    pub async fn close_bead(&self, bead_id: &BeadId, acting_agent_id: Option<&AgentId>) -> Result<Bead> {
        self.update_bead_status(bead_id, BeadStatus::Closed, acting_agent_id)
            .await
    }

    /// Open escalations, used to avoid filing the same escalation twice.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn open_escalations(&self) -> Result<Vec<Bead>> {
        self.list_beads(
            &BeadFilter::default()
                .with_status(BeadStatus::Open)
                .with_type(BeadType::Escalation),
        )
        .await
    }

    /// Clears the assignee of every `in_progress` bead assigned to a dead
    /// agent. Status is left alone. Returns the released beads in creation
    /// order; a second call finds nothing.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn release_dead_assignments(&self) -> Result<Vec<BeadId>> {
        let mut tx = self.begin().await?;
        let orphaned: Vec<BeadId> = sqlx::query_scalar::<_, String>(
            "SELECT id FROM beads
             WHERE rig_id = ?1 AND status = 'in_progress' AND assignee_agent_id IN (
                 SELECT id FROM agents WHERE rig_id = ?2 AND status = 'dead')
             ORDER BY rowid",
        )
        .bind(self.rig_id.value())
        .bind(self.rig_id.value())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("load beads held by dead agents"))?
        .into_iter()
        .map(BeadId::new)
        .collect();

        let now = Utc::now();
        for bead_id in &orphaned {
            clear_assignee(&mut tx, &self.rig_id, bead_id, now).await?;
        }
        tx.commit().await.map_err(db_error("commit dead assignment release"))?;
        Ok(orphaned)
    }
}

pub(super) async fn fetch_bead(
    conn: &mut Conn,
    rig_id: &RigId,
    bead_id: &BeadId,
) -> Result<Option<Bead>> {
    let sql = format!("SELECT {BEAD_COLUMNS} FROM beads WHERE rig_id = ?1 AND id = ?2");
    sqlx::query_as::<_, BeadRow>(&sql)
        .bind(rig_id.value())
        .bind(bead_id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("load bead"))?
        .map(BeadRow::into_bead)
        .transpose()
}

pub(super) async fn insert_bead(
    conn: &mut Conn,
    rig_id: &RigId,
    new_bead: &NewBead,
    now: DateTime<Utc>,
) -> Result<Bead> {
    let bead = Bead {
        id: BeadId::generate(),
        rig_id: rig_id.clone(),
        bead_type: new_bead.bead_type,
        status: BeadStatus::Open,
        title: new_bead.title.trim().to_string(),
        body: new_bead.body.clone(),
        assignee_agent_id: new_bead.assignee.clone(),
        convoy_id: new_bead.convoy_id.clone(),
        priority: new_bead.priority.unwrap_or_default(),
        labels: new_bead.labels.clone(),
        metadata: new_bead.metadata.clone(),
        created_at: now,
        updated_at: now,
        closed_at: None,
    };

    sqlx::query(
        "INSERT INTO beads (id, rig_id, bead_type, status, title, body, assignee_agent_id,
             convoy_id, priority, labels, metadata, created_at, updated_at, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL)",
    )
    .bind(bead.id.value())
    .bind(rig_id.value())
    .bind(bead.bead_type.as_str())
    .bind(bead.status.as_str())
    .bind(&bead.title)
    .bind(bead.body.as_deref())
    .bind(bead.assignee_agent_id.as_ref().map(AgentId::value))
    .bind(bead.convoy_id.as_deref())
    .bind(bead.priority.as_str())
    .bind(serde_json::to_string(&bead.labels)?)
    .bind(serde_json::to_string(&bead.metadata)?)
    .bind(bead.created_at)
    .bind(bead.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error("insert bead"))?;

    debug!(rig_id = %rig_id, bead_id = %bead.id, "Inserted bead row");
    Ok(bead)
}

/// Terminal statuses also stamp `closed_at`.
pub(super) async fn write_bead_status(
    conn: &mut Conn,
    rig_id: &RigId,
    bead_id: &BeadId,
    status: BeadStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    let closed_at = status.is_terminal().then_some(now);
    sqlx::query(
        "UPDATE beads SET status = ?1, updated_at = ?2, closed_at = ?3
         WHERE rig_id = ?4 AND id = ?5",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(closed_at)
    .bind(rig_id.value())
    .bind(bead_id.value())
    .execute(&mut *conn)
    .await
    .map_err(db_error("update bead status"))
    .map(|_result| ())
}

pub(super) async fn assign_in_progress(
    conn: &mut Conn,
    rig_id: &RigId,
    bead_id: &BeadId,
    agent_id: &AgentId,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE beads SET status = 'in_progress', assignee_agent_id = ?1, updated_at = ?2
         WHERE rig_id = ?3 AND id = ?4",
    )
    .bind(agent_id.value())
    .bind(now)
    .bind(rig_id.value())
    .bind(bead_id.value())
    .execute(&mut *conn)
    .await
    .map_err(db_error("assign bead"))
    .map(|_result| ())
}

pub(super) async fn clear_assignee(
    conn: &mut Conn,
    rig_id: &RigId,
    bead_id: &BeadId,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE beads SET assignee_agent_id = NULL, updated_at = ?1
         WHERE rig_id = ?2 AND id = ?3",
    )
    .bind(now)
    .bind(rig_id.value())
    .bind(bead_id.value())
    .execute(&mut *conn)
    .await
    .map_err(db_error("clear bead assignee"))
    .map(|_result| ())
}
