use super::{render_template, run_command};
use crate::config::GitCommands;
use crate::error::GastownError;
use crate::ports::{GitHost, MergeOutcome, MergeRequest, PortFuture};
use crate::types::RigId;
use std::time::Duration;
use tracing::info;

/// Git host driven by the `[git]` command templates.
#[derive(Debug, Clone)]
pub struct CommandGitHost {
    commands: GitCommands,
    timeout: Duration,
}

impl CommandGitHost {
    #[must_use]
    pub const fn new(commands: GitCommands, timeout: Duration) -> Self {
        Self { commands, timeout }
    }
}

impl GitHost for CommandGitHost {
    /// A non-zero exit is a conflict; the entry fails and waits for a resubmit.
    fn merge<'a>(&'a self, request: &'a MergeRequest) -> PortFuture<'a, MergeOutcome> {
        Box::pin(async move {
            let argv = render_template(
                &self.commands.merge_cmd,
                "merge",
                &[
                    ("rig_id", request.rig_id.value()),
                    ("git_url", request.git_url.as_str()),
                    ("branch", request.branch.as_str()),
                    ("default_branch", request.default_branch.as_str()),
                    ("bead_id", request.bead_id.value()),
                ],
            )?;
            let output = run_command(&argv, self.timeout).await?;
            if output.success {
                info!(rig_id = %request.rig_id, branch = %request.branch, "Branch merged");
                Ok(MergeOutcome::Merged)
            } else {
                Ok(MergeOutcome::Conflict {
                    detail: output.failure_detail(),
                })
            }
        })
    }

    fn push<'a>(
        &'a self,
        rig_id: &'a RigId,
        git_url: &'a str,
        branch: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let argv = render_template(
                &self.commands.push_cmd,
                "push",
                &[
                    ("rig_id", rig_id.value()),
                    ("git_url", git_url),
                    ("branch", branch),
                    ("default_branch", branch),
                ],
            )?;
            let output = run_command(&argv, self.timeout).await?;
            if output.success {
                Ok(())
            } else {
                Err(GastownError::ExternalUnavailable(format!(
                    "push of {branch} failed: {}",
                    output.failure_detail()
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::types::BeadId;

    fn request() -> MergeRequest {
        MergeRequest {
            rig_id: RigId::new("rig-1"),
            git_url: "https://example.com/widgets.git".to_string(),
            branch: "fix/1".to_string(),
            default_branch: "main".to_string(),
            bead_id: BeadId::new("bd-1"),
        }
    }

    fn host(merge_cmd: &str, push_cmd: &str) -> CommandGitHost {
        CommandGitHost::new(
            GitCommands {
                merge_cmd: merge_cmd.to_string(),
                push_cmd: push_cmd.to_string(),
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn merge_exit_code_decides_outcome() {
        let merged = host("true {git_url} {branch} {default_branch}", "true")
            .merge(&request())
            .await
            .unwrap();
        assert_eq!(merged, MergeOutcome::Merged);

        let conflict = host("false", "true").merge(&request()).await.unwrap();
        assert!(matches!(conflict, MergeOutcome::Conflict { .. }));
    }

    #[tokio::test]
    async fn unconfigured_merge_is_unavailable() {
        let result = host("", "true").merge(&request()).await;
        assert!(matches!(result, Err(GastownError::ExternalUnavailable(_))));
    }

    #[tokio::test]
    async fn failed_push_is_an_error() {
        let result = host("true", "false")
            .push(&RigId::new("rig-1"), "https://example.com/w.git", "main")
            .await;
        assert!(matches!(result, Err(GastownError::ExternalUnavailable(ref msg)) if msg.contains("main")));
        assert!(host("true", "true")
            .push(&RigId::new("rig-1"), "https://example.com/w.git", "main")
            .await
            .is_ok());
    }
}
