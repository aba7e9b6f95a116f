//! Route handlers
//!
//! `reboot` and `power` hand a resolved node batch and a level to the
//! executor; `nodes` and `rights` only read. Requests for kinds owned by
//! other services get `NOT_SERVED`.

use crate::error::{ApiError, Result};
use crate::kinds::ApiKind;
use crate::AppState;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::Uri;
use axum::routing::{get, post};
use axum::{Json, Router};
use fleetboot_bmc::PowerMode;
use fleetboot_common::{FleetView, Grant, NodeState, Operation, RightsStore};
use fleetboot_macrostep::{MacrostepArgs, MacrostepReport, Macrostep, RebootKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Header carrying the authenticated user
pub const USER_HEADER: &str = "x-fleetboot-user";

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User(pub String);

impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| User(user.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Debug, Deserialize)]
pub struct RebootRequest {
    pub nodes: Vec<String>,
    #[serde(default)]
    pub kind: RebootKind,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub kexec: bool,
}

#[derive(Debug, Deserialize)]
pub struct PowerRequest {
    pub nodes: Vec<String>,
    pub mode: PowerMode,
    #[serde(default)]
    pub level: i64,
}

#[derive(Debug, Deserialize)]
pub struct NodesQuery {
    /// Comma-separated hostnames; the whole inventory when absent
    pub nodes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RightsResponse {
    pub user: String,
    pub grants: Vec<Grant>,
}

/// API router; state is attached by the caller
pub fn router() -> Router<AppState> {
    Router::new()
        .route(ApiKind::Reboot.path_prefix(), post(reboot))
        .route(ApiKind::Power.path_prefix(), post(power))
        .route(ApiKind::Nodes.path_prefix(), get(nodes))
        .route(ApiKind::Rights.path_prefix(), get(rights))
        .fallback(fallback)
}

async fn reboot(
    State(state): State<AppState>,
    User(user): User,
    Json(request): Json<RebootRequest>,
) -> Result<Json<MacrostepReport>> {
    let macrostep = request.kind.macrostep();
    info!(user = %user, macrostep = %macrostep, level = request.level, nodes = request.nodes.len(), "Reboot requested");

    let ctx = state.context(&user, request.nodes);
    let args = MacrostepArgs {
        profile: request.profile,
        kexec: request.kexec,
    };
    let report = state
        .executor
        .run(&ctx, macrostep, request.level, &args)
        .await?;
    Ok(Json(report))
}

async fn power(
    State(state): State<AppState>,
    User(user): User,
    Json(request): Json<PowerRequest>,
) -> Result<Json<MacrostepReport>> {
    let macrostep = Macrostep::power(request.mode);
    info!(user = %user, macrostep = %macrostep, level = request.level, nodes = request.nodes.len(), "Power operation requested");

    let ctx = state.context(&user, request.nodes);
    let report = state
        .executor
        .run(&ctx, macrostep, request.level, &MacrostepArgs::default())
        .await?;
    Ok(Json(report))
}

/// Current state of each requested node, `null` when unrecorded
async fn nodes(
    State(state): State<AppState>,
    User(user): User,
    Query(query): Query<NodesQuery>,
) -> Result<Json<BTreeMap<String, Option<NodeState>>>> {
    let requested: Vec<String> = match query.nodes {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|node| !node.is_empty())
            .map(String::from)
            .collect(),
        None => state.fleet.hostnames(),
    };

    let ctx = state.context(&user, requested);
    ctx.authorize(Operation::NodesGet).await?;

    let states = state.fleet.get_states(&ctx.nodes).await?;
    debug!(user = %user, nodes = states.len(), "Node states read");
    Ok(Json(states.into_iter().collect()))
}

async fn rights(State(state): State<AppState>, User(user): User) -> Result<Json<RightsResponse>> {
    let grants = state.rights.grants(&user).await?;
    Ok(Json(RightsResponse { user, grants }))
}

async fn fallback(uri: Uri) -> ApiError {
    match ApiKind::from_path(uri.path()) {
        Some(kind) if !kind.is_served() => ApiError::NotServed(kind.to_string()),
        _ => ApiError::NotFound,
    }
}
