//! Town and rig registry endpoints.

use super::error::{ApiJson, ApiResult};
use super::AppState;
use crate::types::{NewRig, Rig, RigId, Town, TownId};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateTownBody {
    name: String,
    owner: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRigBody {
    name: String,
    git_url: String,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRigBody {
    name: String,
}

/// POST /towns
pub async fn create_town(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateTownBody>,
) -> ApiResult<(StatusCode, Json<Town>)> {
    let town = state.orchestrator.create_town(&body.name, &body.owner).await?;
    Ok((StatusCode::CREATED, Json(town)))
}

/// GET /towns
pub async fn list_towns(State(state): State<AppState>) -> ApiResult<Json<Vec<Town>>> {
    Ok(Json(state.orchestrator.list_towns().await?))
}

/// GET /towns/{town_id}
pub async fn get_town(
    State(state): State<AppState>,
    Path(town_id): Path<TownId>,
) -> ApiResult<Json<Town>> {
    Ok(Json(state.orchestrator.get_town(&town_id).await?))
}

/// POST /towns/{town_id}/rigs
pub async fn create_rig(
    State(state): State<AppState>,
    Path(town_id): Path<TownId>,
    ApiJson(body): ApiJson<CreateRigBody>,
) -> ApiResult<(StatusCode, Json<Rig>)> {
    let mut new_rig = NewRig::new(town_id, body.name, body.git_url);
    new_rig.default_branch = body.default_branch;
    let rig = state.orchestrator.create_rig(&new_rig).await?;
    Ok((StatusCode::CREATED, Json(rig)))
}

/// GET /towns/{town_id}/rigs
pub async fn list_rigs(
    State(state): State<AppState>,
    Path(town_id): Path<TownId>,
) -> ApiResult<Json<Vec<Rig>>> {
    Ok(Json(state.orchestrator.list_rigs(&town_id).await?))
}

/// GET /rigs/{rig_id}
pub async fn get_rig(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
) -> ApiResult<Json<Rig>> {
    Ok(Json(state.orchestrator.get_rig(&rig_id).await?))
}

/// PATCH /rigs/{rig_id}
pub async fn rename_rig(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
    ApiJson(body): ApiJson<RenameRigBody>,
) -> ApiResult<Json<Rig>> {
    Ok(Json(state.orchestrator.rename_rig(&rig_id, &body.name).await?))
}

/// DELETE /rigs/{rig_id}
pub async fn delete_rig(
    State(state): State<AppState>,
    Path(rig_id): Path<RigId>,
) -> ApiResult<StatusCode> {
    state.orchestrator.delete_rig(&rig_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
