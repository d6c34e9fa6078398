use super::{render_template, run_command, CommandOutput};
use crate::config::SandboxCommands;
use crate::error::{GastownError, Result};
use crate::ports::{
    DispatchOutcome, DispatchRequest, PortFuture, SandboxControl, SandboxStatus, StreamTicket,
};
use crate::types::{AgentId, AgentStatus, RigId};
use serde::Deserialize;
use std::time::Duration;

/// Sandbox driven by the `[sandbox]` command templates.
#[derive(Debug, Clone)]
pub struct CommandSandbox {
    commands: SandboxCommands,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct StartReport {
    status: AgentStatus,
}

#[derive(Debug, Deserialize)]
struct StatusReport {
    state: String,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl CommandSandbox {
    #[must_use]
    pub const fn new(commands: SandboxCommands, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    async fn run(&self, template: &str, what: &str, values: &[(&str, &str)]) -> Result<CommandOutput> {
        let argv = render_template(template, what, values)?;
        run_command(&argv, self.timeout).await
    }

    async fn run_checked(&self, template: &str, what: &str, values: &[(&str, &str)]) -> Result<String> {
        let output = self.run(template, what, values).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(GastownError::ExternalUnavailable(format!(
                "sandbox {what} failed: {}",
                output.failure_detail()
            )))
        }
    }
}

/// Reads the reported status from `{"status": ...}` on stdout; anything else
/// counts as `working`.
fn started_status(stdout: &str) -> AgentStatus {
    serde_json::from_str::<StartReport>(stdout).map_or(AgentStatus::Working, |report| report.status)
}

impl SandboxControl for CommandSandbox {
    fn start<'a>(&'a self, request: &'a DispatchRequest) -> PortFuture<'a, DispatchOutcome> {
        Box::pin(async move {
            let attempt = request.attempt.to_string();
            let output = self
                .run(
                    &self.commands.start_cmd,
                    "start",
                    &[
                        ("rig_id", request.rig_id.value()),
                        ("agent_id", request.agent_id.value()),
                        ("bead_id", request.bead_id.value()),
                        ("attempt", attempt.as_str()),
                    ],
                )
                .await?;
            if output.success {
                Ok(DispatchOutcome::Started {
                    status: started_status(&output.stdout),
                })
            } else {
                Ok(DispatchOutcome::Rejected {
                    reason: output.failure_detail(),
                })
            }
        })
    }

    fn stop<'a>(&'a self, rig_id: &'a RigId, agent_id: &'a AgentId) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.run_checked(
                &self.commands.stop_cmd,
                "stop",
                &[("rig_id", rig_id.value()), ("agent_id", agent_id.value())],
            )
            .await
            .map(|_| ())
        })
    }

    fn send_message<'a>(
        &'a self,
        rig_id: &'a RigId,
        agent_id: &'a AgentId,
        message: &'a str,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.run_checked(
                &self.commands.message_cmd,
                "message",
                &[
                    ("rig_id", rig_id.value()),
                    ("agent_id", agent_id.value()),
                    ("message", message),
                ],
            )
            .await
            .map(|_| ())
        })
    }

    fn status<'a>(
        &'a self,
        rig_id: &'a RigId,
        agent_id: &'a AgentId,
    ) -> PortFuture<'a, SandboxStatus> {
        Box::pin(async move {
            let stdout = self
                .run_checked(
                    &self.commands.status_cmd,
                    "status",
                    &[("rig_id", rig_id.value()), ("agent_id", agent_id.value())],
                )
                .await?;
            let report: StatusReport = serde_json::from_str(&stdout).map_err(|err| {
                GastownError::ExternalUnavailable(format!("sandbox status output unreadable: {err}"))
            })?;
            Ok(SandboxStatus {
                agent_id: agent_id.clone(),
                state: report.state,
                detail: report.detail,
            })
        })
    }

    fn stream_ticket<'a>(
        &'a self,
        rig_id: &'a RigId,
        agent_id: &'a AgentId,
    ) -> PortFuture<'a, StreamTicket> {
        Box::pin(async move {
            let stdout = self
                .run_checked(
                    &self.commands.stream_ticket_cmd,
                    "stream ticket",
                    &[("rig_id", rig_id.value()), ("agent_id", agent_id.value())],
                )
                .await?;
            if let Ok(ticket) = serde_json::from_str::<StreamTicket>(&stdout) {
                return Ok(ticket);
            }
            if stdout.is_empty() {
                return Err(GastownError::ExternalUnavailable(
                    "sandbox returned an empty stream ticket".to_string(),
                ));
            }
            Ok(StreamTicket {
                ticket: stdout,
                url: None,
            })
        })
    }
}
