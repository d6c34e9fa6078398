use super::mappers::{RigRow, TownRow, RIG_COLUMNS, TOWN_COLUMNS};
use super::{db_error, Database};
use crate::error::{GastownError, Result};
use crate::types::{validate_rig_name, NewRig, Rig, RigId, Town, TownId};
use chrono::Utc;

impl Database {
    /// # Errors
    /// Returns `Validation` for a blank name or owner.
    pub async fn create_town(&self, name: &str, owner: &str) -> Result<Town> {
        if name.trim().is_empty() {
            return Err(GastownError::Validation(
                "town name must not be empty".to_string(),
            ));
        }
        if owner.trim().is_empty() {
            return Err(GastownError::Validation(
                "town owner must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let town = Town {
            id: TownId::generate(),
            name: name.trim().to_string(),
            owner: owner.trim().to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO towns (id, name, owner, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(town.id.value())
        .bind(&town.name)
        .bind(&town.owner)
        .bind(town.created_at)
        .bind(town.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error("create town"))?;

        Ok(town)
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn get_town(&self, town_id: &TownId) -> Result<Option<Town>> {
        let sql = format!("SELECT {TOWN_COLUMNS} FROM towns WHERE id = ?1");
        sqlx::query_as::<_, TownRow>(&sql)
            .bind(town_id.value())
            .fetch_optional(self.pool())
            .await
            .map(|row| row.map(Town::from))
            .map_err(db_error("load town"))
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn list_towns(&self) -> Result<Vec<Town>> {
        let sql = format!("SELECT {TOWN_COLUMNS} FROM towns ORDER BY rowid");
        sqlx::query_as::<_, TownRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map(|rows| rows.into_iter().map(Town::from).collect())
            .map_err(db_error("list towns"))
    }

    /// # Errors
    /// Returns `NotFound` for an unknown town and `Validation` for bad rig input.
    pub async fn create_rig(&self, new_rig: &NewRig) -> Result<Rig> {
        new_rig.validate()?;
        if self.get_town(&new_rig.town_id).await?.is_none() {
            return Err(GastownError::NotFound(format!("town {}", new_rig.town_id)));
        }

        let now = Utc::now();
        let rig = Rig {
            id: RigId::generate(),
            town_id: new_rig.town_id.clone(),
            name: new_rig.name.trim().to_string(),
            git_url: new_rig.git_url.trim().to_string(),
            default_branch: new_rig.default_branch().to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO rigs (id, town_id, name, git_url, default_branch, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(rig.id.value())
        .bind(rig.town_id.value())
        .bind(&rig.name)
        .bind(&rig.git_url)
        .bind(&rig.default_branch)
        .bind(rig.created_at)
        .bind(rig.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error("create rig"))?;

        Ok(rig)
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn get_rig(&self, rig_id: &RigId) -> Result<Option<Rig>> {
        let sql = format!("SELECT {RIG_COLUMNS} FROM rigs WHERE id = ?1");
        sqlx::query_as::<_, RigRow>(&sql)
            .bind(rig_id.value())
            .fetch_optional(self.pool())
            .await
            .map(|row| row.map(Rig::from))
            .map_err(db_error("load rig"))
    }

    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn list_rigs(&self, town_id: &TownId) -> Result<Vec<Rig>> {
        let sql = format!("SELECT {RIG_COLUMNS} FROM rigs WHERE town_id = ?1 ORDER BY rowid");
        sqlx::query_as::<_, RigRow>(&sql)
            .bind(town_id.value())
            .fetch_all(self.pool())
            .await
            .map(|rows| rows.into_iter().map(Rig::from).collect())
            .map_err(db_error("list rigs"))
    }

    /// Rename is the only mutation a rig accepts after creation.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown rig and `Validation` for a blank name.
    pub async fn rename_rig(&self, rig_id: &RigId, name: &str) -> Result<Rig> {
        validate_rig_name(name)?;
        let updated = sqlx::query("UPDATE rigs SET name = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(name.trim())
            .bind(Utc::now())
            .bind(rig_id.value())
            .execute(self.pool())
            .await
            .map_err(db_error("rename rig"))?;

        if updated.rows_affected() == 0 {
            return Err(GastownError::NotFound(format!("rig {rig_id}")));
        }
        self.get_rig(rig_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("rig {rig_id}")))
    }

    /// Deletes the rig and, through foreign-key cascades, every bead, agent,
    /// mail message, review entry and alarm it owns.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn delete_rig(&self, rig_id: &RigId) -> Result<bool> {
        sqlx::query("DELETE FROM rigs WHERE id = ?1")
            .bind(rig_id.value())
            .execute(self.pool())
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(db_error("delete rig"))
    }

    /// Rigs whose timer is armed; used to restart their actors after a restart.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn rigs_with_alarms(&self) -> Result<Vec<RigId>> {
        sqlx::query_scalar::<_, String>("SELECT rig_id FROM rig_alarms ORDER BY rig_id")
            .fetch_all(self.pool())
            .await
            .map(|ids| ids.into_iter().map(RigId::new).collect())
            .map_err(db_error("list armed rigs"))
    }
}
