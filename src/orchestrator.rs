#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Town and rig registry plus the table of live rig actors.

use crate::config::SchedulerSettings;
use crate::db::Database;
use crate::error::{GastownError, Result};
use crate::ports::{GitHost, SandboxControl};
use crate::rig_actor::{spawn_rig_actor, RigHandle};
use crate::types::{NewRig, Rig, RigId, Town, TownId};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct RigSlot {
    handle: RigHandle,
    task: JoinHandle<()>,
}

impl RigSlot {
    fn is_alive(&self) -> bool {
        !self.handle.is_closed() && !self.task.is_finished()
    }
}

pub struct Orchestrator {
    db: Database,
    sandbox: Arc<dyn SandboxControl>,
    git: Arc<dyn GitHost>,
    settings: SchedulerSettings,
    actors: Mutex<HashMap<RigId, RigSlot>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        db: Database,
        sandbox: Arc<dyn SandboxControl>,
        git: Arc<dyn GitHost>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            db,
            sandbox,
            git,
            settings,
            actors: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    pub async fn create_town(&self, name: &str, owner: &str) -> Result<Town> {
        self.db.create_town(name, owner).await
    }

    pub async fn get_town(&self, town_id: &TownId) -> Result<Town> {
        self.db
            .get_town(town_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("town {town_id}")))
    }

    pub async fn list_towns(&self) -> Result<Vec<Town>> {
        self.db.list_towns().await
    }

    pub async fn create_rig(&self, new_rig: &NewRig) -> Result<Rig> {
        self.db.create_rig(new_rig).await
    }

    pub async fn get_rig(&self, rig_id: &RigId) -> Result<Rig> {
        self.db
            .get_rig(rig_id)
            .await?
            .ok_or_else(|| GastownError::NotFound(format!("rig {rig_id}")))
    }

    /// # Errors
    /// `NotFound` for an unknown town.
    pub async fn list_rigs(&self, town_id: &TownId) -> Result<Vec<Rig>> {
        self.get_town(town_id).await?;
        self.db.list_rigs(town_id).await
    }

    pub async fn rename_rig(&self, rig_id: &RigId, name: &str) -> Result<Rig> {
        self.db.rename_rig(rig_id, name).await
    }

    /// Stops the rig's actor, then deletes the rig and every row it owns.
    pub async fn delete_rig(&self, rig_id: &RigId) -> Result<()> {
        let slot = self.actors.lock().await.remove(rig_id);
        if let Some(slot) = slot {
            slot.handle.stop().await;
            if let Err(err) = slot.task.await {
                warn!(rig_id = %rig_id, error = %err, "Rig actor ended abnormally");
            }
        }
        if self.db.delete_rig(rig_id).await? {
            info!(rig_id = %rig_id, "Rig deleted");
            Ok(())
        } else {
            Err(GastownError::NotFound(format!("rig {rig_id}")))
        }
    }

    /// Handle to the rig's actor, spawning it on first use or after it died.
    ///
    /// # Errors
    /// `NotFound` for an unknown rig.
    pub async fn rig(&self, rig_id: &RigId) -> Result<RigHandle> {
        let mut actors = self.actors.lock().await;
        if let Some(slot) = actors.get(rig_id) {
            if slot.is_alive() {
                return Ok(slot.handle.clone());
            }
            warn!(rig_id = %rig_id, "Rig actor found dead, respawning");
        }

        self.get_rig(rig_id).await?;
        let (handle, task) = spawn_rig_actor(
            self.db.rig_store(rig_id.clone()),
            Arc::clone(&self.sandbox),
            Arc::clone(&self.git),
            self.settings,
        );
        actors.insert(
            rig_id.clone(),
            RigSlot {
                handle: handle.clone(),
                task,
            },
        );
        Ok(handle)
    }

    /// Spawns an actor for every rig with a persisted alarm so timers survive
    /// restarts. Returns how many rigs were resumed.
    pub async fn resume(&self) -> Result<usize> {
        let rig_ids = self.db.rigs_with_alarms().await?;
        for rig_id in &rig_ids {
            self.rig(rig_id).await?;
        }
        if !rig_ids.is_empty() {
            info!(rigs = rig_ids.len(), "Resumed rig timers");
        }
        Ok(rig_ids.len())
    }

    /// Number of actors currently running.
    pub async fn live_actors(&self) -> usize {
        self.actors
            .lock()
            .await
            .values()
            .filter(|slot| slot.is_alive())
            .count()
    }

    /// Stops every actor and waits for their tasks to end.
    pub async fn shutdown(&self) {
        let slots: Vec<RigSlot> = self.actors.lock().await.drain().map(|(_, slot)| slot).collect();
        join_all(slots.iter().map(|slot| slot.handle.stop())).await;
        for result in join_all(slots.into_iter().map(|slot| slot.task)).await {
            if let Err(err) = result {
                warn!(error = %err, "Rig actor ended abnormally");
            }
        }
    }
}
