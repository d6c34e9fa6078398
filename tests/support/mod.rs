#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use gastown::ports::{
    DispatchOutcome, DispatchRequest, GitHost, MergeOutcome, MergeRequest, PortFuture,
    SandboxControl, SandboxStatus, StreamTicket,
};
use gastown::{AgentId, AgentStatus, Database, GastownError, Orchestrator, RigId, SchedulerSettings};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sandbox that starts every agent as `Working` unless told to refuse.
#[derive(Clone, Default)]
pub struct RecordingSandbox {
    pub offline: Arc<Mutex<bool>>,
    pub started: Arc<Mutex<Vec<DispatchRequest>>>,
    pub stopped: Arc<Mutex<Vec<AgentId>>>,
    pub messages: Arc<Mutex<Vec<(AgentId, String)>>>,
}

impl RecordingSandbox {
    async fn reachable(&self) -> gastown::Result<()> {
        if *self.offline.lock().await {
            Err(GastownError::ExternalUnavailable("sandbox offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SandboxControl for RecordingSandbox {
    fn start<'a>(&'a self, request: &'a DispatchRequest) -> PortFuture<'a, DispatchOutcome> {
        Box::pin(async move {
            self.reachable().await?;
            self.started.lock().await.push(request.clone());
            Ok(DispatchOutcome::Started {
                status: AgentStatus::Working,
            })
        })
    }

    fn stop<'a>(&'a self, _rig_id: &'a RigId, agent_id: &'a AgentId) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.reachable().await?;
            self.stopped.lock().await.push(agent_id.clone());
            Ok(())
        })
    }

    fn send_message<'a>(
        &'a self,
        _rig_id: &'a RigId,
        agent_id: &'a AgentId,
        message: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.reachable().await?;
            self.messages
                .lock()
                .await
                .push((agent_id.clone(), message.to_string()));
            Ok(())
        })
    }

    fn status<'a>(
        &'a self,
        _rig_id: &'a RigId,
        agent_id: &'a AgentId,
    ) -> PortFuture<'a, SandboxStatus> {
        Box::pin(async move {
            self.reachable().await?;
            Ok(SandboxStatus {
                agent_id: agent_id.clone(),
                state: "running".to_string(),
                detail: None,
            })
        })
    }

    fn stream_ticket<'a>(
        &'a self,
        _rig_id: &'a RigId,
        agent_id: &'a AgentId,
    ) -> PortFuture<'a, StreamTicket> {
        Box::pin(async move {
            self.reachable().await?;
            Ok(StreamTicket {
                ticket: format!("ticket-{agent_id}"),
                url: None,
            })
        })
    }
}

/// Git host that merges everything and records pushes, unless offline.
#[derive(Clone, Default)]
pub struct RecordingGit {
    pub offline: Arc<Mutex<bool>>,
    pub merges: Arc<Mutex<Vec<MergeRequest>>>,
    pub pushes: Arc<Mutex<Vec<String>>>,
}

impl GitHost for RecordingGit {
    fn merge<'a>(&'a self, request: &'a MergeRequest) -> PortFuture<'a, MergeOutcome> {
        Box::pin(async move {
            if *self.offline.lock().await {
                return Err(GastownError::ExternalUnavailable("git host offline".to_string()));
            }
            self.merges.lock().await.push(request.clone());
            Ok(MergeOutcome::Merged)
        })
    }

    fn push<'a>(
        &'a self,
        _rig_id: &'a RigId,
        _git_url: &'a str,
        branch: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.pushes.lock().await.push(branch.to_string());
            Ok(())
        })
    }
}

/// Timer policy slow enough that tests drive every fire by hand.
pub fn manual_settings() -> SchedulerSettings {
    SchedulerSettings {
        arm_delay_ms: 600_000,
        active_interval_ms: 600_000,
        idle_interval_ms: 3_600_000,
        ..SchedulerSettings::default()
    }
}

pub fn orchestrator_over(
    db: Database,
    sandbox: &RecordingSandbox,
    git: &RecordingGit,
) -> Orchestrator {
    Orchestrator::new(
        db,
        Arc::new(sandbox.clone()),
        Arc::new(git.clone()),
        manual_settings(),
    )
}
