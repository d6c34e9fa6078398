use super::bounded;
use crate::config::SchedulerSettings;
use crate::db::RigStore;
use crate::error::Result;
use crate::ports::SandboxControl;
use crate::types::{AgentFilter, AgentId, NewBead, PatrolReport};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

/// Label carried by escalations the patrol files for stuck dispatches.
pub const STUCK_DISPATCH_LABEL: &str = "stuck-dispatch";

/// Liveness sweep.
///
/// 1. Live agents silent past the heartbeat timeout are unhooked, then
///    marked dead. Their beads stay `in_progress` and are reported orphaned.
/// 2. Dead agents still holding a hook are unhooked the same way.
/// 3. `in_progress` beads still assigned to a dead agent lose the assignee
///    and are reported orphaned.
/// 4. Newly dead agents get a best-effort sandbox stop.
/// 5. Idle hooked agents whose dispatch counter reached the threshold get one
///    open escalation each.
///
/// A second sweep right after the first reports the same dead agents and no
/// orphans.
///
/// # Errors
/// Returns an error if the rig's storage fails.
pub async fn run_patrol(
    store: &RigStore,
    sandbox: &dyn SandboxControl,
    settings: &SchedulerSettings,
    now: DateTime<Utc>,
) -> Result<PatrolReport> {
    let timeout = settings.heartbeat_timeout();
    let agents = store.list_agents(&AgentFilter::default()).await?;
    let mut report = PatrolReport::default();
    let mut newly_dead = HashSet::new();

    for agent in &agents {
        let stale = agent.status.is_alive() && agent.is_stale(now, timeout);
        let dead_holding_hook = !agent.status.is_alive() && agent.current_hook_bead_id.is_some();
        if !stale && !dead_holding_hook {
            continue;
        }
        if let Some(bead_id) = store.retire_agent(&agent.id).await? {
            warn!(rig_id = %store.rig_id(), agent_id = %agent.id, bead_id = %bead_id, "Bead orphaned");
            report.orphaned_beads.push(bead_id);
        }
        if stale {
            newly_dead.insert(agent.id.clone());
        }
    }

    for bead_id in store.release_dead_assignments().await? {
        if report.orphaned_beads.contains(&bead_id) {
            continue;
        }
        warn!(rig_id = %store.rig_id(), bead_id = %bead_id, "Bead orphaned by dead assignee");
        report.orphaned_beads.push(bead_id);
    }

    report.dead_agents = agents
        .iter()
        .filter(|agent| !agent.status.is_alive() || newly_dead.contains(&agent.id))
        .map(|agent| agent.id.clone())
        .collect();

    for agent_id in agents
        .iter()
        .map(|agent| &agent.id)
        .filter(|id| newly_dead.contains(*id))
    {
        stop_best_effort(store, sandbox, settings, agent_id).await;
    }

    let open_escalations = store.open_escalations().await?;
    for agent in agents.iter().filter(|agent| {
        !newly_dead.contains(&agent.id)
            && agent.awaits_dispatch()
            && agent.dispatch_attempts >= settings.stuck_dispatch_threshold
    }) {
        let Some(bead_id) = agent.current_hook_bead_id.as_ref() else {
            continue;
        };
        let already_escalated = open_escalations.iter().any(|escalation| {
            escalation.labels.contains(STUCK_DISPATCH_LABEL) && escalation.concerns(&agent.id, bead_id)
        });
        if already_escalated {
            continue;
        }

        let escalation = store
            .create_bead(
                &NewBead::escalation(format!(
                    "Dispatch of {bead_id} to {} stuck after {} attempts",
                    agent.name, agent.dispatch_attempts
                ))
                .with_label(STUCK_DISPATCH_LABEL)
                .with_source(Some(&agent.id), Some(bead_id)),
            )
            .await?;
        info!(rig_id = %store.rig_id(), agent_id = %agent.id, escalation_id = %escalation.id, "Filed stuck-dispatch escalation");
        report.escalations.push(escalation.id);
    }

    if !report.dead_agents.is_empty() || !report.orphaned_beads.is_empty() {
        info!(
            rig_id = %store.rig_id(),
            dead = report.dead_agents.len(),
            orphaned = report.orphaned_beads.len(),
            "Witness patrol complete"
        );
    }
    Ok(report)
}

async fn stop_best_effort(
    store: &RigStore,
    sandbox: &dyn SandboxControl,
    settings: &SchedulerSettings,
    agent_id: &AgentId,
) {
    if let Err(err) = bounded(
        settings.external_call_timeout(),
        "sandbox stop",
        sandbox.stop(store.rig_id(), agent_id),
    )
    .await
    {
        warn!(rig_id = %store.rig_id(), agent_id = %agent_id, error = %err, "Failed to stop dead agent's sandbox");
    }
}
