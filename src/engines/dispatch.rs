use super::bounded;
use crate::config::SchedulerSettings;
use crate::db::RigStore;
use crate::error::Result;
use crate::ports::{DispatchOutcome, DispatchRequest, SandboxControl};
use crate::types::{
    AgentFilter, AgentStatus, DispatchAttempt, DispatchReport, DispatchResult,
};
use tracing::{info, warn};

/// Asks the sandbox to start every idle agent that holds a hook.
///
/// Sandbox failures never escape: the agent stays idle and hooked and the
/// next fire tries again. Only storage failures are returned.
///
/// # Errors
/// Returns an error if the rig's storage fails.
pub async fn run_dispatch(
    store: &RigStore,
    sandbox: &dyn SandboxControl,
    settings: &SchedulerSettings,
) -> Result<DispatchReport> {
    let idle = store
        .list_agents(&AgentFilter {
            status: Some(AgentStatus::Idle),
            role: None,
        })
        .await?;

    let mut report = DispatchReport::default();
    for agent in idle.into_iter().filter(|agent| agent.awaits_dispatch()) {
        let Some(bead_id) = agent.current_hook_bead_id.clone() else {
            continue;
        };
        let attempt = store.record_dispatch_attempt(&agent.id).await?;
        let bead_title = store
            .get_bead(&bead_id)
            .await?
            .map(|bead| bead.title)
            .unwrap_or_default();

        let request = DispatchRequest {
            rig_id: store.rig_id().clone(),
            agent_id: agent.id.clone(),
            bead_id: bead_id.clone(),
            bead_title,
            attempt,
            checkpoint: agent.checkpoint.clone(),
        };

        let result = match bounded(
            settings.external_call_timeout(),
            "sandbox start",
            sandbox.start(&request),
        )
        .await
        {
            Ok(DispatchOutcome::Started { status }) => {
                let applied = store.apply_dispatch_status(&agent.id, status).await?;
                info!(
                    rig_id = %store.rig_id(),
                    agent_id = %agent.id,
                    bead_id = %bead_id,
                    attempt,
                    reported = %status,
                    applied,
                    "Dispatch started agent"
                );
                DispatchResult::Started { status }
            }
            Ok(DispatchOutcome::Rejected { reason }) => {
                warn!(rig_id = %store.rig_id(), agent_id = %agent.id, attempt, reason = %reason, "Sandbox rejected dispatch");
                DispatchResult::Deferred { reason }
            }
            Err(err) => {
                warn!(rig_id = %store.rig_id(), agent_id = %agent.id, attempt, error = %err, "Dispatch deferred");
                DispatchResult::Deferred {
                    reason: err.to_string(),
                }
            }
        };

        report.attempts.push(DispatchAttempt {
            agent_id: agent.id,
            bead_id,
            attempt,
            result,
        });
    }

    Ok(report)
}
