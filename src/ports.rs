//! Narrow interfaces to the two external collaborators a rig drives: the
//! sandbox that runs agents and the git host that merges their branches.
//!
//! Implementations report ordinary refusals (a rejected start, a merge
//! conflict) as `Ok` outcomes and reserve `Err(ExternalUnavailable)` for a
//! collaborator that could not be reached.

use crate::types::{AgentId, AgentStatus, BeadId, RigId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Everything a sandbox needs to start one agent on one bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub rig_id: RigId,
    pub agent_id: AgentId,
    pub bead_id: BeadId,
    pub bead_title: String,
    pub attempt: u32,
    pub checkpoint: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Started { status: AgentStatus },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxStatus {
    pub agent_id: AgentId,
    pub state: String,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

/// Short-lived credential for attaching to an agent's output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTicket {
    pub ticket: String,
    #[serde(default)]
    pub url: Option<String>,
}

pub trait SandboxControl: Send + Sync {
    fn start<'a>(&'a self, request: &'a DispatchRequest) -> PortFuture<'a, DispatchOutcome>;

    fn stop<'a>(&'a self, rig_id: &'a RigId, agent_id: &'a AgentId) -> PortFuture<'a, ()>;

    fn send_message<'a>(
        &'a self,
        rig_id: &'a RigId,
        agent_id: &'a AgentId,
        message: &'a str,
    ) -> PortFuture<'a, ()>;

    fn status<'a>(&'a self, rig_id: &'a RigId, agent_id: &'a AgentId)
        -> PortFuture<'a, SandboxStatus>;

    fn stream_ticket<'a>(
        &'a self,
        rig_id: &'a RigId,
        agent_id: &'a AgentId,
    ) -> PortFuture<'a, StreamTicket>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub rig_id: RigId,
    pub git_url: String,
    pub branch: String,
    pub default_branch: String,
    pub bead_id: BeadId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged,
    Conflict { detail: String },
}

pub trait GitHost: Send + Sync {
    /// Merge `request.branch` into `request.default_branch`. Merging a branch
    /// that is already merged must report `Merged`.
    fn merge<'a>(&'a self, request: &'a MergeRequest) -> PortFuture<'a, MergeOutcome>;

    fn push<'a>(&'a self, rig_id: &'a RigId, git_url: &'a str, branch: &'a str)
        -> PortFuture<'a, ()>;
}
