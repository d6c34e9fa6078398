#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use super::agents::{fetch_agent, release_hook_holder};
use super::beads::{fetch_bead, write_bead_status};
use super::mappers::{ReviewRow, REVIEW_COLUMNS};
use super::{db_error, Conn, RigStore};
use crate::error::{GastownError, Result};
use crate::types::{
    validate_branch, AgentId, BeadStatus, MergeResult, NewReviewEntry, ReviewEntry, ReviewStatus,
    RigId,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{info, warn};

impl RigStore {
    /// Submits the agent's hooked bead for merge, then releases the hook.
    /// The bead keeps its assignee and stays `in_progress` until merged.
    ///
    /// # Errors
    /// Returns `Validation` for a bad branch, `NotFound` for an unknown agent
    /// and `Conflict` when the agent holds no hook.
    pub async fn agent_done(
        &self,
        agent_id: &AgentId,
        branch: &str,
        pr_url: Option<String>,
        summary: Option<String>,
    ) -> Result<ReviewEntry> {
        validate_branch(branch)?;
        let mut tx = self.begin().await?;
        let agent = fetch_agent(&mut tx, &self.rig_id, agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {agent_id}")))?;
        let Some(bead_id) = agent.current_hook_bead_id.clone() else {
            return Err(GastownError::Conflict(format!(
                "agent {agent_id} has no hooked bead"
            )));
        };

        let now = Utc::now();
        let entry = NewReviewEntry::new(agent_id.clone(), bead_id, branch)
            .with_pr_url(pr_url)
            .with_summary(summary);
        let review = insert_review(&mut tx, &self.rig_id, &entry, now).await?;

        sqlx::query(
            "UPDATE agents SET current_hook_bead_id = NULL, status = 'idle', last_activity_at = ?1
             WHERE rig_id = ?2 AND id = ?3",
        )
        .bind(now)
        .bind(self.rig_id.value())
        .bind(agent_id.value())
        .execute(&mut *tx)
        .await
        .map_err(db_error("release hook after done"))?;
        tx.commit().await.map_err(db_error("commit agent done"))?;

        info!(
            rig_id = %self.rig_id,
            agent_id = %agent_id,
            bead_id = %review.bead_id,
            entry_id = review.id,
            branch = %review.branch,
            "Agent done; review queued"
        );
        Ok(review)
    }

    /// Inserts a `pending` entry.
    ///
    /// # Errors
    /// Returns `Validation` for a bad branch, `NotFound` for an unknown agent
    /// or bead and `Conflict` for a terminal bead.
    pub async fn submit_review(&self, entry: &NewReviewEntry) -> Result<ReviewEntry> {
        entry.validate()?;
        let mut tx = self.begin().await?;
        fetch_agent(&mut tx, &self.rig_id, &entry.agent_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("agent {}", entry.agent_id)))?;
        let bead = fetch_bead(&mut tx, &self.rig_id, &entry.bead_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("bead {}", entry.bead_id)))?;
        if bead.is_terminal() {
            return Err(GastownError::Conflict(format!(
                "bead {} is already {}",
                bead.id, bead.status
            )));
        }

        let review = insert_review(&mut tx, &self.rig_id, entry, Utc::now()).await?;
        tx.commit().await.map_err(db_error("commit review submission"))?;

        info!(rig_id = %self.rig_id, entry_id = review.id, bead_id = %review.bead_id, "Review queued");
        Ok(review)
    }

    /// Moves the oldest `pending` entry to `merging` and returns it. Returns
    /// `None` when the queue is empty or a merge is already in flight.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn pop_review(&self) -> Result<Option<ReviewEntry>> {
        let mut tx = self.begin().await?;
        let in_flight = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM review_queue WHERE rig_id = ?1 AND status = 'merging'",
        )
        .bind(self.rig_id.value())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("count merging reviews"))?;
        if in_flight > 0 {
            return Ok(None);
        }

        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM review_queue
             WHERE rig_id = ?1 AND status = 'pending'
             ORDER BY id LIMIT 1"
        );
        let Some(row) = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(self.rig_id.value())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("load oldest review"))?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        set_review_status(&mut tx, &self.rig_id, row.id, ReviewStatus::Merging, None, now).await?;
        let entry = fetch_review(&mut tx, &self.rig_id, row.id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("review entry {}", row.id)))?;
        tx.commit().await.map_err(db_error("commit review pop"))?;
        Ok(Some(entry))
    }

    /// Records a merge outcome. Repeating the outcome an entry already has is
    /// a no-op; a merged entry closes its bead and releases any hook on it.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown entry and `Conflict` when the entry
    /// already ended with the other outcome.
    pub async fn complete_review(&self, entry_id: i64, result: &MergeResult) -> Result<ReviewEntry> {
        let (status, reason) = match result {
            MergeResult::Merged => (ReviewStatus::Merged, None),
            MergeResult::Failed { reason } => (ReviewStatus::Failed, Some(reason.as_str())),
        };

        let mut tx = self.begin().await?;
        let entry = fetch_review(&mut tx, &self.rig_id, entry_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("review entry {entry_id}")))?;
        if entry.status == status {
            return Ok(entry);
        }
        if entry.status.is_terminal() {
            return Err(GastownError::Conflict(format!(
                "review entry {entry_id} is already {}",
                entry.status
            )));
        }

        let now = Utc::now();
        set_review_status(&mut tx, &self.rig_id, entry_id, status, reason, now).await?;
        if status == ReviewStatus::Merged {
            close_merged_bead(&mut tx, &self.rig_id, &entry, now).await?;
        }
        let updated = fetch_review(&mut tx, &self.rig_id, entry_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("review entry {entry_id}")))?;
        tx.commit().await.map_err(db_error("commit review outcome"))?;

        match status {
            ReviewStatus::Merged => {
                info!(rig_id = %self.rig_id, entry_id, bead_id = %entry.bead_id, "Review merged");
            }
            _ => {
                warn!(rig_id = %self.rig_id, entry_id, bead_id = %entry.bead_id, reason = ?reason, "Review failed");
            }
        }
        Ok(updated)
    }

    /// Entries in submission order.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn list_review_queue(&self, status: Option<ReviewStatus>) -> Result<Vec<ReviewEntry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {REVIEW_COLUMNS} FROM review_queue WHERE rig_id = "
        ));
        builder.push_bind(self.rig_id.value());
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY id");

        let rows = builder
            .build_query_as::<ReviewRow>()
            .fetch_all(self.pool())
            .await
            .map_err(db_error("list review queue"))?;
        rows.into_iter().map(ReviewRow::into_entry).collect()
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn get_review(&self, entry_id: i64) -> Result<Option<ReviewEntry>> {
        let mut conn = self.acquire().await?;
        fetch_review(&mut conn, &self.rig_id, entry_id).await
    }

    /// Returns entries stranded in `merging` by an interrupted fire to
    /// `pending`. Returns how many were requeued.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn requeue_merging(&self) -> Result<u64> {
        let requeued = sqlx::query(
            "UPDATE review_queue SET status = 'pending', updated_at = ?1
             WHERE rig_id = ?2 AND status = 'merging'",
        )
        .bind(Utc::now())
        .bind(self.rig_id.value())
        .execute(self.pool())
        .await
        .map_err(db_error("requeue merging reviews"))?
        .rows_affected();

        if requeued > 0 {
            warn!(rig_id = %self.rig_id, requeued, "Requeued interrupted merges");
        }
        Ok(requeued)
    }

    /// Returns `merging` entries untouched since before `cutoff` to
    /// `pending`, so a pop nobody completed stops blocking the queue.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn requeue_stale_merging(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let requeued = sqlx::query(
            "UPDATE review_queue SET status = 'pending', updated_at = ?1
             WHERE rig_id = ?2 AND status = 'merging' AND updated_at < ?3",
        )
        .bind(Utc::now())
        .bind(self.rig_id.value())
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(db_error("requeue stale merging reviews"))?
        .rows_affected();

        if requeued > 0 {
            warn!(rig_id = %self.rig_id, requeued, cutoff = %cutoff, "Requeued abandoned merges");
        }
        Ok(requeued)
    }
}

pub(super) async fn insert_review(
    conn: &mut Conn,
    rig_id: &RigId,
    entry: &NewReviewEntry,
    now: DateTime<Utc>,
) -> Result<ReviewEntry> {
    let id = sqlx::query(
        "INSERT INTO review_queue (rig_id, agent_id, bead_id, branch, pr_url, summary, status,
             failure_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', NULL, ?7, ?8)",
    )
    .bind(rig_id.value())
    .bind(entry.agent_id.value())
    .bind(entry.bead_id.value())
    .bind(entry.branch.trim())
    .bind(entry.pr_url.as_deref())
    .bind(entry.summary.as_deref())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(db_error("insert review entry"))?
    .last_insert_rowid();

    Ok(ReviewEntry {
        id,
        rig_id: rig_id.clone(),
        agent_id: entry.agent_id.clone(),
        bead_id: entry.bead_id.clone(),
        branch: entry.branch.trim().to_string(),
        pr_url: entry.pr_url.clone(),
        summary: entry.summary.clone(),
        status: ReviewStatus::Pending,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    })
}

async fn fetch_review(conn: &mut Conn, rig_id: &RigId, entry_id: i64) -> Result<Option<ReviewEntry>> {
    let sql = format!("SELECT {REVIEW_COLUMNS} FROM review_queue WHERE rig_id = ?1 AND id = ?2");
    sqlx::query_as::<_, ReviewRow>(&sql)
        .bind(rig_id.value())
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("load review entry"))?
        .map(ReviewRow::into_entry)
        .transpose()
}

async fn set_review_status(
    conn: &mut Conn,
    rig_id: &RigId,
    entry_id: i64,
    status: ReviewStatus,
    failure_reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE review_queue SET status = ?1, failure_reason = ?2, updated_at = ?3
         WHERE rig_id = ?4 AND id = ?5",
    )
    .bind(status.as_str())
    .bind(failure_reason)
    .bind(now)
    .bind(rig_id.value())
    .bind(entry_id)
    .execute(&mut *conn)
    .await
    .map_err(db_error("update review status"))
    .map(|_result| ())
}

async fn close_merged_bead(
    conn: &mut Conn,
    rig_id: &RigId,
    entry: &ReviewEntry,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(bead) = fetch_bead(conn, rig_id, &entry.bead_id).await? else {
        return Ok(());
    };
    if bead.is_terminal() {
        return Ok(());
    }
    if let Some(holder) = release_hook_holder(conn, rig_id, &bead.id).await? {
        info!(rig_id = %rig_id, agent_id = %holder, bead_id = %bead.id, "Hook released by merge");
    }
    write_bead_status(conn, rig_id, &bead.id, BeadStatus::Closed, now).await
}
