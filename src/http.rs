//! HTTP surface over the orchestrator.
//!
//! `/health` is public; everything else sits behind the bearer-token check
//! when `api_token` is configured.

mod error;
mod rig_routes;
mod town_routes;

pub use error::{ApiError, ApiResult, ProblemDetails};

use crate::error::GastownError;
use crate::orchestrator::Orchestrator;
use crate::types::AgentId;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Header naming the agent on whose behalf a request is made.
pub const AGENT_ID_HEADER: &str = "x-agent-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, api_token: Option<String>) -> Self {
        Self {
            orchestrator,
            api_token: api_token
                .filter(|token| !token.trim().is_empty())
                .map(Arc::from),
        }
    }
}

pub(crate) fn acting_agent(headers: &HeaderMap) -> Option<AgentId> {
    headers
        .get(AGENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(AgentId::new)
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };
    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if presented == Some(expected) {
        next.run(request).await
    } else {
        ApiError(GastownError::Unauthorized(
            "missing or invalid bearer token".to_string(),
        ))
        .into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "live_actors": state.orchestrator.live_actors().await,
    }))
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/towns",
            post(town_routes::create_town).get(town_routes::list_towns),
        )
        .route("/towns/{town_id}", get(town_routes::get_town))
        .route(
            "/towns/{town_id}/rigs",
            post(town_routes::create_rig).get(town_routes::list_rigs),
        )
        .route(
            "/rigs/{rig_id}",
            get(town_routes::get_rig)
                .patch(town_routes::rename_rig)
                .delete(town_routes::delete_rig),
        )
        .route(
            "/rigs/{rig_id}/beads",
            post(rig_routes::create_bead).get(rig_routes::list_beads),
        )
        .route("/rigs/{rig_id}/beads/{bead_id}", get(rig_routes::get_bead))
        .route(
            "/rigs/{rig_id}/beads/{bead_id}/status",
            patch(rig_routes::update_bead_status),
        )
        .route(
            "/rigs/{rig_id}/beads/{bead_id}/close",
            post(rig_routes::close_bead),
        )
        .route(
            "/rigs/{rig_id}/agents",
            post(rig_routes::register_agent).get(rig_routes::list_agents),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}",
            get(rig_routes::get_agent).delete(rig_routes::delete_agent),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/hook",
            post(rig_routes::hook_bead).delete(rig_routes::unhook_bead),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/done",
            post(rig_routes::agent_done),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/heartbeat",
            post(rig_routes::heartbeat),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/checkpoint",
            post(rig_routes::write_checkpoint).get(rig_routes::read_checkpoint),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/mail",
            get(rig_routes::check_mail),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/prime",
            get(rig_routes::prime_agent),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/nudge",
            post(rig_routes::nudge_agent),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/sandbox",
            get(rig_routes::sandbox_status),
        )
        .route(
            "/rigs/{rig_id}/agents/{agent_id}/stream-ticket",
            post(rig_routes::stream_ticket),
        )
        .route("/rigs/{rig_id}/mail", post(rig_routes::send_mail))
        .route(
            "/rigs/{rig_id}/review-queue",
            post(rig_routes::submit_review).get(rig_routes::list_review_queue),
        )
        .route(
            "/rigs/{rig_id}/review-queue/pop",
            post(rig_routes::pop_review),
        )
        .route(
            "/rigs/{rig_id}/review-queue/{entry_id}/complete",
            post(rig_routes::complete_review),
        )
        .route(
            "/rigs/{rig_id}/escalations",
            post(rig_routes::create_escalation),
        )
        .route("/rigs/{rig_id}/sling", post(rig_routes::sling))
        .route("/rigs/{rig_id}/patrol", post(rig_routes::witness_patrol))
        .route("/rigs/{rig_id}/timer", get(rig_routes::alarm))
        .route("/rigs/{rig_id}/timer/fire", post(rig_routes::fire_timer))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state);

    Router::new().merge(public_routes).merge(api_routes)
}

/// Serves `state` on `listener` until `shutdown` resolves.
///
/// # Errors
/// `IoError` when the server loop fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
