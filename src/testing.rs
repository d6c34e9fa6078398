#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

//! Recording collaborator fakes for unit tests.

use crate::db::{Database, RigStore};
use crate::error::{GastownError, Result};
use crate::ports::{
    DispatchOutcome, DispatchRequest, GitHost, MergeOutcome, MergeRequest, PortFuture,
    SandboxControl, SandboxStatus, StreamTicket,
};
use crate::types::{AgentId, AgentRole, AgentStatus, BeadId, NewAgent, NewBead, NewRig, RigId};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    Start(AgentStatus),
    Reject,
    Unavailable,
    Hang,
}

#[derive(Clone)]
pub struct FakeSandbox {
    pub mode: Arc<Mutex<SandboxMode>>,
    pub started: Arc<Mutex<Vec<DispatchRequest>>>,
    pub stopped: Arc<Mutex<Vec<AgentId>>>,
    pub messages: Arc<Mutex<Vec<(AgentId, String)>>>,
}

impl FakeSandbox {
    pub fn new(mode: SandboxMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            started: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(Mutex::new(Vec::new())),
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(SandboxMode::Start(AgentStatus::Working))
    }

    pub async fn set_mode(&self, mode: SandboxMode) {
        *self.mode.lock().await = mode;
    }

    async fn gate(&self) -> Result<SandboxMode> {
        let mode = *self.mode.lock().await;
        match mode {
            SandboxMode::Unavailable => Err(GastownError::ExternalUnavailable(
                "sandbox offline".to_string(),
            )),
            SandboxMode::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(mode)
            }
            _ => Ok(mode),
        }
    }
}

impl SandboxControl for FakeSandbox {
    fn start<'a>(&'a self, request: &'a DispatchRequest) -> PortFuture<'a, DispatchOutcome> {
        Box::pin(async move {
            let mode = self.gate().await?;
            self.started.lock().await.push(request.clone());
            Ok(match mode {
                SandboxMode::Start(status) => DispatchOutcome::Started { status },
                _ => DispatchOutcome::Rejected {
                    reason: "no capacity".to_string(),
                },
            })
        })
    }

    fn stop<'a>(&'a self, _rig_id: &'a RigId, agent_id: &'a AgentId) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.gate().await?;
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
            self.gate().await?;
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
            self.gate().await?;
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
            self.gate().await?;
            Ok(StreamTicket {
                ticket: format!("ticket-{agent_id}"),
                url: None,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitMode {
    Merge,
    Conflict(String),
    PushFails,
    Unavailable,
}

#[derive(Clone)]
pub struct FakeGit {
    pub mode: Arc<Mutex<GitMode>>,
    pub merges: Arc<Mutex<Vec<MergeRequest>>>,
    pub pushes: Arc<Mutex<Vec<String>>>,
}

impl FakeGit {
    pub fn new(mode: GitMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            merges: Arc::new(Mutex::new(Vec::new())),
            pushes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl GitHost for FakeGit {
    fn merge<'a>(&'a self, request: &'a MergeRequest) -> PortFuture<'a, MergeOutcome> {
        Box::pin(async move {
            let mode = self.mode.lock().await.clone();
            if mode == GitMode::Unavailable {
                return Err(GastownError::ExternalUnavailable("git host down".to_string()));
            }
            self.merges.lock().await.push(request.clone());
            Ok(match mode {
                GitMode::Conflict(detail) => MergeOutcome::Conflict { detail },
                _ => MergeOutcome::Merged,
            })
        })
    }

    fn push<'a>(
        &'a self,
        _rig_id: &'a RigId,
        _git_url: &'a str,
        branch: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            if *self.mode.lock().await == GitMode::PushFails {
                return Err(GastownError::ExternalUnavailable("remote rejected".to_string()));
            }
            self.pushes.lock().await.push(branch.to_string());
            Ok(())
        })
    }
}

pub async fn rig_fixture() -> (Database, RigStore) {
    let db = Database::in_memory().await.unwrap();
    let town = db.create_town("acme", "lewis").await.unwrap();
    let rig = db
        .create_rig(&NewRig::new(town.id, "widgets", "https://example.com/widgets.git"))
        .await
        .unwrap();
    let store = db.rig_store(rig.id);
    (db, store)
}

/// Registers a polecat and hooks a fresh issue to it.
pub async fn hooked_polecat(store: &RigStore, name: &str) -> (AgentId, BeadId) {
    let agent = store
        .register_agent(&NewAgent::new(AgentRole::Polecat, name, format!("{name}@test")))
        .await
        .unwrap();
    let bead = store
        .create_bead(&NewBead::issue(format!("work for {name}")))
        .await
        .unwrap();
    store.hook_bead(&agent.id, &bead.id).await.unwrap();
    (agent.id, bead.id)
}
