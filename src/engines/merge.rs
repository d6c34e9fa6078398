use super::bounded;
use crate::config::SchedulerSettings;
use crate::db::RigStore;
use crate::error::Result;
use crate::ports::{GitHost, MergeOutcome, MergeRequest};
use crate::types::{MergeReport, MergeResult};
use chrono::{Duration, Utc};
use tracing::{info, warn};

/// Drains at most one review entry: oldest pending first.
///
/// An entry left `merging` longer than the external-call timeout, such as one
/// popped over the API and never completed, goes back to `pending` first.
///
/// A failed merge fails the entry and leaves its bead alone; nothing is
/// retried automatically.
///
/// # Errors
/// Returns an error if the rig's storage fails.
pub async fn run_merge(
    store: &RigStore,
    git: &dyn GitHost,
    settings: &SchedulerSettings,
) -> Result<Option<MergeReport>> {
    let rig = store.rig().await?;
    let limit = settings.external_call_timeout();
    if let Some(cutoff) = Duration::from_std(limit)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
    {
        store.requeue_stale_merging(cutoff).await?;
    }
    let Some(entry) = store.pop_review().await? else {
        return Ok(None);
    };

    let request = MergeRequest {
        rig_id: rig.id.clone(),
        git_url: rig.git_url.clone(),
        branch: entry.branch.clone(),
        default_branch: rig.default_branch.clone(),
        bead_id: entry.bead_id.clone(),
    };

    let result = match bounded(limit, "git merge", git.merge(&request)).await {
        Ok(MergeOutcome::Merged) => {
            match bounded(
                limit,
                "git push",
                git.push(&rig.id, &rig.git_url, &rig.default_branch),
            )
            .await
            {
                Ok(()) => MergeResult::Merged,
                Err(err) => MergeResult::Failed {
                    reason: format!("push of {} failed: {err}", rig.default_branch),
                },
            }
        }
        Ok(MergeOutcome::Conflict { detail }) => MergeResult::Failed {
            reason: format!("merge conflict: {detail}"),
        },
        Err(err) => MergeResult::Failed {
            reason: err.to_string(),
        },
    };

    store.complete_review(entry.id, &result).await?;
    match &result {
        MergeResult::Merged => {
            info!(rig_id = %rig.id, entry_id = entry.id, branch = %entry.branch, "Merge engine merged entry");
        }
        MergeResult::Failed { reason } => {
            warn!(rig_id = %rig.id, entry_id = entry.id, branch = %entry.branch, reason = %reason, "Merge engine failed entry");
        }
    }

    Ok(Some(MergeReport {
        entry_id: entry.id,
        bead_id: entry.bead_id,
        branch: entry.branch,
        result,
    }))
}
