//! One actor per rig. Every read and write of a rig's rows, and every timer
//! fire, runs on the actor's task one at a time; rigs never share an actor.

mod command;
mod handle;
mod timer;

#[cfg(test)]
mod tests;

pub use handle::RigHandle;
pub use timer::{fire_time, next_interval, should_rearm};

use crate::config::SchedulerSettings;
use crate::db::RigStore;
use crate::engines::{run_dispatch, run_merge, run_patrol};
use crate::error::Result;
use crate::ports::{GitHost, SandboxControl};
use crate::types::{FireReport, RigActivity};
use chrono::{DateTime, Utc};
use command::RigCommand;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;

pub(crate) struct RigActor {
    store: RigStore,
    sandbox: Arc<dyn SandboxControl>,
    git: Arc<dyn GitHost>,
    settings: SchedulerSettings,
    alarm: Option<DateTime<Utc>>,
}

/// Start the actor task for `store`'s rig.
pub fn spawn_rig_actor(
    store: RigStore,
    sandbox: Arc<dyn SandboxControl>,
    git: Arc<dyn GitHost>,
    settings: SchedulerSettings,
) -> (RigHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = RigHandle::new(store.rig_id().clone(), command_tx);
    let actor = RigActor {
        store,
        sandbox,
        git,
        settings,
        alarm: None,
    };
    let task = tokio::spawn(actor.run(command_rx));
    (handle, task)
}

impl RigActor {
    async fn run(mut self, mut command_rx: mpsc::Receiver<RigCommand>) {
        self.recover().await;

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    match command {
                        RigCommand::Run(job) => job(&mut self).await,
                        RigCommand::Fire { reply_tx } => {
                            let report = self.fire().await;
                            let _ = reply_tx.send(report);
                        }
                        RigCommand::Alarm { reply_tx } => {
                            let _ = reply_tx.send(self.alarm);
                        }
                        RigCommand::Stop { reply_tx } => {
                            let _ = reply_tx.send(());
                            break;
                        }
                    }
                }
                () = timer::alarm_due(self.alarm) => {
                    self.fire().await;
                }
            }
        }
        debug!(rig_id = %self.store.rig_id(), "Rig actor stopped");
    }

    /// Undo what a crash mid-fire left behind, then pick the persisted alarm back up.
    async fn recover(&mut self) {
        let rig_id = self.store.rig_id().clone();
        match self.store.requeue_merging().await {
            Ok(0) => {}
            Ok(requeued) => info!(rig_id = %rig_id, requeued, "Requeued interrupted merges"),
            Err(err) => warn!(rig_id = %rig_id, error = %err, "Failed to requeue interrupted merges"),
        }
        match self.store.alarm().await {
            Ok(alarm) => self.alarm = alarm,
            Err(err) => warn!(rig_id = %rig_id, error = %err, "Failed to load persisted alarm"),
        }
    }

    /// Dispatch, then merge, then patrol. A failing pass is recorded and the
    /// rest still run; the timer is always re-armed.
    async fn fire(&mut self) -> FireReport {
        let rig_id = self.store.rig_id().clone();
        let mut errors = Vec::new();

        let dispatch = run_dispatch(&self.store, self.sandbox.as_ref(), &self.settings)
            .await
            .map_err(|err| record(&mut errors, "dispatch", &err))
            .ok();
        let merge = run_merge(&self.store, self.git.as_ref(), &self.settings)
            .await
            .map_err(|err| record(&mut errors, "merge", &err))
            .ok()
            .flatten();
        let patrol = run_patrol(&self.store, self.sandbox.as_ref(), &self.settings, Utc::now())
            .await
            .map_err(|err| record(&mut errors, "witness", &err))
            .ok();

        // An unreadable rig polls at the active rate until it reads again.
        let activity = self.store.activity().await.unwrap_or_else(|err| {
            record(&mut errors, "activity", &err);
            RigActivity {
                live_agents: 1,
                ..RigActivity::default()
            }
        });
        let next_alarm = fire_time(Utc::now(), next_interval(&self.settings, activity));
        if let Err(err) = self.set_alarm(next_alarm).await {
            record(&mut errors, "re-arm", &err);
        }

        for failure in &errors {
            error!(rig_id = %rig_id, error = %failure, "Timer fire step failed");
        }
        debug!(rig_id = %rig_id, next_alarm = %next_alarm, active = activity.is_active(), "Timer fired");

        FireReport {
            dispatch,
            merge,
            patrol,
            errors,
            activity,
            next_alarm,
        }
    }

    /// Arm the timer `arm_delay` from now unless it is already due sooner.
    ///
    /// Callers have already committed their write, so a failure to persist
    /// the alarm is logged and the in-memory alarm still fires.
    pub(crate) async fn arm_soon(&mut self) {
        let candidate = fire_time(Utc::now(), self.settings.arm_delay());
        if !should_rearm(self.alarm, candidate) {
            return;
        }
        if let Err(err) = self.set_alarm(candidate).await {
            warn!(rig_id = %self.store.rig_id(), alarm = %candidate, error = %err, "Failed to persist rig alarm");
        }
    }

    async fn set_alarm(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.alarm = Some(at);
        self.store.set_alarm(at).await
    }
}

fn record(errors: &mut Vec<String>, step: &str, err: &crate::error::GastownError) {
    errors.push(format!("{step}: {err}"));
}
