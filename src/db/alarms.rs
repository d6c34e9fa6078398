use super::{db_error, RigStore};
use crate::error::Result;
use chrono::{DateTime, Utc};

impl RigStore {
    /// Persisted fire time of this rig's timer, if armed.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn alarm(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>("SELECT fire_at FROM rig_alarms WHERE rig_id = ?1")
            .bind(self.rig_id.value())
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("load alarm"))
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn set_alarm(&self, fire_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO rig_alarms (rig_id, fire_at) VALUES (?1, ?2)
             ON CONFLICT (rig_id) DO UPDATE SET fire_at = excluded.fire_at",
        )
        .bind(self.rig_id.value())
        .bind(fire_at)
        .execute(self.pool())
        .await
        .map_err(db_error("store alarm"))
        .map(|_result| ())
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn clear_alarm(&self) -> Result<()> {
        sqlx::query("DELETE FROM rig_alarms WHERE rig_id = ?1")
            .bind(self.rig_id.value())
            .execute(self.pool())
            .await
            .map_err(db_error("clear alarm"))
            .map(|_result| ())
    }
}
