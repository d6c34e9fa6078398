use super::command::{Job, RigCommand};
use super::RigActor;
use crate::engines::{bounded, run_patrol};
use crate::error::{GastownError, Result};
use crate::ports::{SandboxStatus, StreamTicket};
use crate::types::{
    Agent, AgentFilter, AgentId, Bead, BeadFilter, BeadId, BeadStatus, EscalationRequest,
    FireReport, MailMessage, MergeResult, NewAgent, NewBead, NewMail, NewReviewEntry,
    PatrolReport, PrimeContext, ReviewEntry, ReviewStatus, RigId, SlingRequest, SlingResult,
};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

fn job<F>(run: F) -> Job
where
    F: for<'a> FnOnce(&'a mut RigActor) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(run)
}

/// Cheap, cloneable address of one rig's actor.
#[derive(Clone)]
pub struct RigHandle {
    rig_id: RigId,
    command_tx: mpsc::Sender<RigCommand>,
}

impl RigHandle {
    pub(super) const fn new(rig_id: RigId, command_tx: mpsc::Sender<RigCommand>) -> Self {
        Self { rig_id, command_tx }
    }

    #[must_use]
    pub const fn rig_id(&self) -> &RigId {
        &self.rig_id
    }

    /// True once the actor task has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    fn unavailable(&self, what: &str) -> GastownError {
        GastownError::ActorUnavailable(format!("rig {} actor {what}", self.rig_id))
    }

    async fn send(&self, command: RigCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| self.unavailable("is not running"))
    }

    async fn call<T, F>(&self, run: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut RigActor) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RigCommand::Run(job(move |actor| {
            Box::pin(async move {
                let _ = reply_tx.send(run(actor).await);
            })
        })))
        .await?;
        reply_rx
            .await
            .map_err(|_| self.unavailable("dropped the reply"))?
    }

    // Beads

    pub async fn create_bead(&self, new_bead: NewBead) -> Result<Bead> {
        self.call(move |actor| Box::pin(async move { actor.store.create_bead(&new_bead).await }))
            .await
    }

    pub async fn get_bead(&self, bead_id: BeadId) -> Result<Bead> {
        self.call(move |actor| Box::pin(async move { actor.store.require_bead(&bead_id).await }))
            .await
    }

    pub async fn list_beads(&self, filter: BeadFilter) -> Result<Vec<Bead>> {
        self.call(move |actor| Box::pin(async move { actor.store.list_beads(&filter).await }))
            .await
    }

    pub async fn update_bead_status(
        &self,
        bead_id: BeadId,
        status: BeadStatus,
        acting_agent_id: Option<AgentId>,
    ) -> Result<Bead> {
        self.call(move |actor| {
            Box::pin(async move {
                actor
                    .store
                    .update_bead_status(&bead_id, status, acting_agent_id.as_ref())
                    .await
            })
        })
        .await
    }

    pub async fn close_bead(&self, bead_id: BeadId, acting_agent_id: Option<AgentId>) -> Result<Bead> {
        self.call(move |actor| {
            Box::pin(async move { actor.store.close_bead(&bead_id, acting_agent_id.as_ref()).await })
        })
        .await
    }

    pub async fn create_escalation(&self, request: EscalationRequest) -> Result<Bead> {
        let new_bead = request.into_new_bead();
        self.create_bead(new_bead).await
    }

    // Agents

    pub async fn register_agent(&self, new_agent: NewAgent) -> Result<Agent> {
        self.call(move |actor| Box::pin(async move { actor.store.register_agent(&new_agent).await }))
            .await
    }

    pub async fn get_agent(&self, agent_id: AgentId) -> Result<Agent> {
        self.call(move |actor| Box::pin(async move { actor.store.require_agent(&agent_id).await }))
            .await
    }

    pub async fn list_agents(&self, filter: AgentFilter) -> Result<Vec<Agent>> {
        self.call(move |actor| Box::pin(async move { actor.store.list_agents(&filter).await }))
            .await
    }

    /// Hooks `bead_id` to `agent_id` and arms the timer.
    pub async fn hook_bead(&self, agent_id: AgentId, bead_id: BeadId) -> Result<Bead> {
        self.call(move |actor| {
            Box::pin(async move {
                let bead = actor.store.hook_bead(&agent_id, &bead_id).await?;
                actor.arm_soon().await;
                Ok(bead)
            })
        })
        .await
    }

    pub async fn unhook_bead(&self, agent_id: AgentId) -> Result<Agent> {
        self.call(move |actor| Box::pin(async move { actor.store.unhook_bead(&agent_id).await }))
            .await
    }

    /// Queues the held bead for review, releases the hook and arms the timer.
    pub async fn agent_done(
        &self,
        agent_id: AgentId,
        branch: String,
        pr_url: Option<String>,
        summary: Option<String>,
    ) -> Result<ReviewEntry> {
        self.call(move |actor| {
            Box::pin(async move {
                let entry = actor
                    .store
                    .agent_done(&agent_id, &branch, pr_url, summary)
                    .await?;
                actor.arm_soon().await;
                Ok(entry)
            })
        })
        .await
    }

    /// `None` for an unknown agent. Arms the timer for known ones.
    pub async fn touch_heartbeat(&self, agent_id: AgentId) -> Result<Option<Agent>> {
        self.call(move |actor| {
            Box::pin(async move {
                let agent = actor.store.touch_heartbeat(&agent_id).await?;
                if agent.is_some() {
                    actor.arm_soon().await;
                }
                Ok(agent)
            })
        })
        .await
    }

    pub async fn write_checkpoint(&self, agent_id: AgentId, checkpoint: serde_json::Value) -> Result<Agent> {
        self.call(move |actor| {
            Box::pin(async move { actor.store.write_checkpoint(&agent_id, &checkpoint).await })
        })
        .await
    }

    pub async fn read_checkpoint(&self, agent_id: AgentId) -> Result<Option<serde_json::Value>> {
        self.call(move |actor| Box::pin(async move { actor.store.read_checkpoint(&agent_id).await }))
            .await
    }

    pub async fn prime_agent(&self, agent_id: AgentId) -> Result<PrimeContext> {
        self.call(move |actor| Box::pin(async move { actor.store.prime_context(&agent_id).await }))
            .await
    }

    /// Returns the bead the agent was hooked to, if any.
    pub async fn delete_agent(&self, agent_id: AgentId) -> Result<Option<BeadId>> {
        self.call(move |actor| Box::pin(async move { actor.store.delete_agent(&agent_id).await }))
            .await
    }

    // Mail

    pub async fn send_mail(&self, mail: NewMail) -> Result<MailMessage> {
        self.call(move |actor| Box::pin(async move { actor.store.send_mail(&mail).await }))
            .await
    }

    pub async fn check_mail(&self, agent_id: AgentId) -> Result<Vec<MailMessage>> {
        self.call(move |actor| Box::pin(async move { actor.store.check_mail(&agent_id).await }))
            .await
    }

    // Review queue

    pub async fn submit_review(&self, entry: NewReviewEntry) -> Result<ReviewEntry> {
        self.call(move |actor| {
            Box::pin(async move {
                let entry = actor.store.submit_review(&entry).await?;
                actor.arm_soon().await;
                Ok(entry)
            })
        })
        .await
    }

    pub async fn pop_review(&self) -> Result<Option<ReviewEntry>> {
        self.call(|actor| Box::pin(async move { actor.store.pop_review().await }))
            .await
    }

    pub async fn complete_review(&self, entry_id: i64, result: MergeResult) -> Result<ReviewEntry> {
        self.call(move |actor| {
            Box::pin(async move { actor.store.complete_review(entry_id, &result).await })
        })
        .await
    }

    pub async fn list_review_queue(&self, status: Option<ReviewStatus>) -> Result<Vec<ReviewEntry>> {
        self.call(move |actor| Box::pin(async move { actor.store.list_review_queue(status).await }))
            .await
    }

    // Coordination

    /// Creates an issue and hooks it in one step, then arms the timer.
    pub async fn sling(&self, request: SlingRequest) -> Result<SlingResult> {
        self.call(move |actor| {
            Box::pin(async move {
                let result = actor.store.sling(&request).await?;
                actor.arm_soon().await;
                Ok(result)
            })
        })
        .await
    }

    pub async fn witness_patrol(&self) -> Result<PatrolReport> {
        self.call(|actor| {
            Box::pin(async move {
                run_patrol(&actor.store, actor.sandbox.as_ref(), &actor.settings, Utc::now()).await
            })
        })
        .await
    }

    /// Runs one timer fire now, out of schedule.
    pub async fn fire_timer(&self) -> Result<FireReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RigCommand::Fire { reply_tx }).await?;
        reply_rx.await.map_err(|_| self.unavailable("dropped the reply"))
    }

    pub async fn alarm(&self) -> Result<Option<DateTime<Utc>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RigCommand::Alarm { reply_tx }).await?;
        reply_rx.await.map_err(|_| self.unavailable("dropped the reply"))
    }

    // Sandbox pass-throughs

    pub async fn nudge_agent(&self, agent_id: AgentId, message: String) -> Result<()> {
        self.call(move |actor| {
            Box::pin(async move {
                actor.store.require_agent(&agent_id).await?;
                bounded(
                    actor.settings.external_call_timeout(),
                    "sandbox message",
                    actor.sandbox.send_message(actor.store.rig_id(), &agent_id, &message),
                )
                .await
            })
        })
        .await
    }

    pub async fn sandbox_status(&self, agent_id: AgentId) -> Result<SandboxStatus> {
        self.call(move |actor| {
            Box::pin(async move {
                actor.store.require_agent(&agent_id).await?;
                bounded(
                    actor.settings.external_call_timeout(),
                    "sandbox status",
                    actor.sandbox.status(actor.store.rig_id(), &agent_id),
                )
                .await
            })
        })
        .await
    }

    pub async fn stream_ticket(&self, agent_id: AgentId) -> Result<StreamTicket> {
        self.call(move |actor| {
            Box::pin(async move {
                actor.store.require_agent(&agent_id).await?;
                bounded(
                    actor.settings.external_call_timeout(),
                    "sandbox stream ticket",
                    actor.sandbox.stream_ticket(actor.store.rig_id(), &agent_id),
                )
                .await
            })
        })
        .await
    }

    /// Stops the actor after the commands already queued and waits until it
    /// has let go of its mailbox. Stopping a stopped actor succeeds.
    pub async fn stop(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.send(RigCommand::Stop { reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }
        self.command_tx.closed().await;
    }
}
