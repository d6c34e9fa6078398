//! Rig-scoped endpoints. Every handler resolves the rig's actor first, so an
//! unknown rig is a 404 before the body is looked at.

use super::error::{parse_enum, parse_optional, ApiJson, ApiQuery, ApiResult};
use super::{acting_agent, AppState};
use crate::error::GastownError;
use crate::ports::{SandboxStatus, StreamTicket};
use crate::rig_actor::RigHandle;
use crate::types::{
    Agent, AgentFilter, AgentId, Bead, BeadFilter, BeadId, BeadMetadata, BeadPriority, BeadType,
    EscalationRequest, FireReport, MailMessage, MergeResult, NewAgent, NewBead, NewMail,
    NewReviewEntry, PatrolReport, PrimeContext, ReviewEntry, RigId, SlingRequest, SlingResult,
};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

async fn rig(state: &AppState, rig_id: &RigId) -> ApiResult<RigHandle> {
    Ok(state.orchestrator.rig(rig_id).await?)
}

// Beads

#[derive(Debug, Deserialize)]
pub struct CreateBeadBody {
    #[serde(rename = "type", default)]
    bead_type: Option<String>,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    labels: BTreeSet<String>,
    #[serde(default)]
    metadata: BeadMetadata,
    #[serde(default)]
    assignee: Option<AgentId>,
    #[serde(default)]
    convoy_id: Option<String>,
}

impl CreateBeadBody {
    fn into_new_bead(self) -> Result<NewBead, GastownError> {
        let bead_type = parse_optional::<BeadType>(self.bead_type.as_deref())?.unwrap_or(BeadType::Issue);
        Ok(NewBead {
            bead_type,
            title: self.title,
            body: self.body,
            priority: parse_optional::<BeadPriority>(self.priority.as_deref())?,
            labels: self.labels,
            metadata: self.metadata,
            assignee: self.assignee,
            convoy_id: self.convoy_id,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BeadQuery {
    status: Option<String>,
    #[serde(rename = "type")]
    bead_type: Option<String>,
    assignee: Option<AgentId>,
    convoy: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    status: String,
}

/// POST /rigs/{rig_id}/beads
pub async fn create_bead(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiJson(body): ApiJson<CreateBeadBody>,
) -> ApiResult<(StatusCode, Json<Bead>)> {
    let handle = rig(&state, &rig_id).await?;
    let bead = handle.create_bead(body.into_new_bead()?).await?;
    Ok((StatusCode::CREATED, Json(bead)))
}

/// GET /rigs/{rig_id}/beads
pub async fn list_beads(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiQuery(query): ApiQuery<BeadQuery>,
) -> ApiResult<Json<Vec<Bead>>> {
    let handle = rig(&state, &rig_id).await?;
    let filter = BeadFilter {
        status: parse_optional(query.status.as_deref())?,
        bead_type: parse_optional(query.bead_type.as_deref())?,
        assignee: query.assignee,
        convoy_id: query.convoy,
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(handle.list_beads(filter).await?))
}

/// GET /rigs/{rig_id}/beads/{bead_id}
pub async fn get_bead(
    State(state): State<AppState>,
    Path((rig_id, bead_id)): Path<(RigId, BeadId)>,
) -> ApiResult<Json<Bead>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.get_bead(bead_id).await?))
}

/// PATCH /rigs/{rig_id}/beads/{bead_id}/status
pub async fn update_bead_status(
    State(state): State<AppState>,
    Path((rig_id, bead_id)): Path<(RigId, BeadId)>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<Json<Bead>> {
    let handle = rig(&state, &rig_id).await?;
    let status = parse_enum(&body.status)?;
    let bead = handle
        .update_bead_status(bead_id, status, acting_agent(&headers))
        .await?;
    Ok(Json(bead))
}

/// POST /rigs/{rig_id}/beads/{bead_id}/close
pub async fn close_bead(
    State(state): State<AppState>,
    Path((rig_id, bead_id)): Path<(RigId, BeadId)>,
    headers: HeaderMap,
) -> ApiResult<Json<Bead>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.close_bead(bead_id, acting_agent(&headers)).await?))
}

/// POST /rigs/{rig_id}/escalations
pub async fn create_escalation(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiJson(body): ApiJson<EscalationRequest>,
) -> ApiResult<(StatusCode, Json<Bead>)> {
    let handle = rig(&state, &rig_id).await?;
    let bead = handle.create_escalation(body).await?;
    Ok((StatusCode::CREATED, Json(bead)))
}

/// POST /rigs/{rig_id}/sling
pub async fn sling(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiJson(body): ApiJson<SlingRequest>,
) -> ApiResult<(StatusCode, Json<SlingResult>)> {
    let handle = rig(&state, &rig_id).await?;
    let result = handle.sling(body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

// Agents

#[derive(Debug, Deserialize)]
pub struct RegisterAgentBody {
    role: String,
    name: String,
    identity: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentQuery {
    status: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HookBody {
    bead_id: BeadId,
}

#[derive(Debug, Deserialize)]
pub struct DoneBody {
    branch: String,
    #[serde(default)]
    pr_url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NudgeBody {
    message: String,
}

#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    agent_id: AgentId,
    checkpoint: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct DeletedAgentResponse {
    agent_id: AgentId,
    unhooked_bead_id: Option<BeadId>,
}

/// POST /rigs/{rig_id}/agents
pub async fn register_agent(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiJson(body): ApiJson<RegisterAgentBody>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let handle = rig(&state, &rig_id).await?;
    let new_agent = NewAgent::new(parse_enum(&body.role)?, body.name, body.identity);
    let agent = handle.register_agent(new_agent).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /rigs/{rig_id}/agents
pub async fn list_agents(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiQuery(query): ApiQuery<AgentQuery>,
) -> ApiResult<Json<Vec<Agent>>> {
    let handle = rig(&state, &rig_id).await?;
    let filter = AgentFilter {
        status: parse_optional(query.status.as_deref())?,
        role: parse_optional(query.role.as_deref())?,
    };
    Ok(Json(handle.list_agents(filter).await?))
}

/// GET /rigs/{rig_id}/agents/{agent_id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<Agent>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.get_agent(agent_id).await?))
}

/// DELETE /rigs/{rig_id}/agents/{agent_id}
pub async fn delete_agent(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<DeletedAgentResponse>> {
    let handle = rig(&state, &rig_id).await?;
    let unhooked_bead_id = handle.delete_agent(agent_id.clone()).await?;
    Ok(Json(DeletedAgentResponse {
        agent_id,
        unhooked_bead_id,
    }))
}

/// POST /rigs/{rig_id}/agents/{agent_id}/hook
pub async fn hook_bead(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
    ApiJson(body): ApiJson<HookBody>,
) -> ApiResult<Json<Bead>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.hook_bead(agent_id, body.bead_id).await?))
}

/// DELETE /rigs/{rig_id}/agents/{agent_id}/hook
pub async fn unhook_bead(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<Agent>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.unhook_bead(agent_id).await?))
}

/// POST /rigs/{rig_id}/agents/{agent_id}/done
pub async fn agent_done(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
    ApiJson(body): ApiJson<DoneBody>,
) -> ApiResult<(StatusCode, Json<ReviewEntry>)> {
    let handle = rig(&state, &rig_id).await?;
    let entry = handle
        .agent_done(agent_id, body.branch, body.pr_url, body.summary)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// POST /rigs/{rig_id}/agents/{agent_id}/heartbeat
///
/// Unknown agents get `null`, not a 404.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<Option<Agent>>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.touch_heartbeat(agent_id).await?))
}

/// POST /rigs/{rig_id}/agents/{agent_id}/checkpoint
pub async fn write_checkpoint(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
    ApiJson(checkpoint): ApiJson<serde_json::Value>,
) -> ApiResult<Json<CheckpointResponse>> {
    let handle = rig(&state, &rig_id).await?;
    let agent = handle.write_checkpoint(agent_id, checkpoint).await?;
    Ok(Json(CheckpointResponse {
        agent_id: agent.id,
        checkpoint: agent.checkpoint,
    }))
}

/// GET /rigs/{rig_id}/agents/{agent_id}/checkpoint
pub async fn read_checkpoint(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<CheckpointResponse>> {
    let handle = rig(&state, &rig_id).await?;
    let checkpoint = handle.read_checkpoint(agent_id.clone()).await?;
    Ok(Json(CheckpointResponse {
        agent_id,
        checkpoint,
    }))
}

/// GET /rigs/{rig_id}/agents/{agent_id}/mail
///
/// Drains the inbox: returned messages are marked delivered.
pub async fn check_mail(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<Vec<MailMessage>>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.check_mail(agent_id).await?))
}

/// GET /rigs/{rig_id}/agents/{agent_id}/prime
pub async fn prime_agent(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<PrimeContext>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.prime_agent(agent_id).await?))
}

/// POST /rigs/{rig_id}/agents/{agent_id}/nudge
pub async fn nudge_agent(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
    ApiJson(body): ApiJson<NudgeBody>,
) -> ApiResult<StatusCode> {
    let handle = rig(&state, &rig_id).await?;
    handle.nudge_agent(agent_id, body.message).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /rigs/{rig_id}/agents/{agent_id}/sandbox
pub async fn sandbox_status(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<SandboxStatus>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.sandbox_status(agent_id).await?))
}

/// POST /rigs/{rig_id}/agents/{agent_id}/stream-ticket
pub async fn stream_ticket(
    State(state): State<AppState>,
    Path((rig_id, agent_id)): Path<(RigId, AgentId)>,
) -> ApiResult<Json<StreamTicket>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.stream_ticket(agent_id).await?))
}

// Mail

/// POST /rigs/{rig_id}/mail
///
/// When the caller names itself in `X-Agent-Id`, it must be the sender.
pub async fn send_mail(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<NewMail>,
) -> ApiResult<(StatusCode, Json<MailMessage>)> {
    if let Some(caller) = acting_agent(&headers) {
        if caller != body.from {
            return Err(GastownError::Conflict(format!(
                "caller {caller} cannot send mail as {}",
                body.from
            ))
            .into());
        }
    }
    let handle = rig(&state, &rig_id).await?;
    let message = handle.send_mail(body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// Review queue

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    status: Option<String>,
}

/// POST /rigs/{rig_id}/review-queue
pub async fn submit_review(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiJson(body): ApiJson<NewReviewEntry>,
) -> ApiResult<(StatusCode, Json<ReviewEntry>)> {
    let handle = rig(&state, &rig_id).await?;
    let entry = handle.submit_review(body).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /rigs/{rig_id}/review-queue
pub async fn list_review_queue(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiQuery(query): ApiQuery<ReviewQuery>,
) -> ApiResult<Json<Vec<ReviewEntry>>> {
    let handle = rig(&state, &rig_id).await?;
    let status = parse_optional(query.status.as_deref())?;
    Ok(Json(handle.list_review_queue(status).await?))
}

/// POST /rigs/{rig_id}/review-queue/pop
pub async fn pop_review(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
) -> ApiResult<Json<Option<ReviewEntry>>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.pop_review().await?))
}

/// POST /rigs/{rig_id}/review-queue/{entry_id}/complete
pub async fn complete_review(
    State(state): State<AppState>,
    Path((rig_id, entry_id)): Path<(RigId, i64)>,
    ApiJson(result): ApiJson<MergeResult>,
) -> ApiResult<Json<ReviewEntry>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.complete_review(entry_id, result).await?))
}

// Timer and patrol

#[derive(Debug, Serialize)]
pub struct AlarmResponse {
    rig_id: RigId,
    alarm: Option<DateTime<Utc>>,
}

/// POST /rigs/{rig_id}/patrol
pub async fn witness_patrol(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
) -> ApiResult<Json<PatrolReport>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.witness_patrol().await?))
}

/// POST /rigs/{rig_id}/timer/fire
pub async fn fire_timer(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
) -> ApiResult<Json<FireReport>> {
    let handle = rig(&state, &rig_id).await?;
    Ok(Json(handle.fire_timer().await?))
}

/// GET /rigs/{rig_id}/timer
pub async fn alarm(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
) -> ApiResult<Json<AlarmResponse>> {
    let handle = rig(&state, &rig_id).await?;
    let alarm = handle.alarm().await?;
    Ok(Json(AlarmResponse { rig_id, alarm }))
}
