use crate::error::GaggleError;
use crate::membership::MembershipCoordinator;
use crate::role::RoleReporter;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub reporter: Arc<RoleReporter>,
    pub coordinator: Arc<MembershipCoordinator>,
}

pub fn create_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/", get(get_role))
        .route("/join", get(join))
        .route("/leave", get(leave))
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/members", get(get_members))
        .with_state(ctx)
}

impl IntoResponse for GaggleError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

#[derive(Deserialize)]
struct MemberQuery {
    #[serde(rename = "nodeAddr")]
    node_addr: Option<String>,
}

async fn get_role(State(ctx): State<ApiContext>) -> Response {
    match ctx.reporter.report() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to encode role: {}", e);
            e.into_response()
        }
    }
}

async fn join(State(ctx): State<ApiContext>, Query(query): Query<MemberQuery>) -> Response {
    let node_addr = query.node_addr.unwrap_or_default();
    debug!("Join request for {:?}", node_addr);

    match ctx.coordinator.join(&node_addr).await {
        Ok(_) => (StatusCode::OK, "Successfully added voter").into_response(),
        Err(e) => {
            warn!("Join of {:?} failed: {}", node_addr, e);
            e.into_response()
        }
    }
}

async fn leave(State(ctx): State<ApiContext>, Query(query): Query<MemberQuery>) -> Response {
    let node_addr = query.node_addr.unwrap_or_default();
    debug!("Leave request for {:?}", node_addr);

    match ctx.coordinator.leave(&node_addr).await {
        Ok(()) => (StatusCode::OK, "Successfully removed server").into_response(),
        Err(e) => {
            warn!("Leave of {:?} failed: {}", node_addr, e);
            e.into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_status(State(ctx): State<ApiContext>) -> Response {
    match ctx.reporter.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_members(State(ctx): State<ApiContext>) -> Response {
    match ctx.reporter.configuration().await {
        Ok(config) => Json(config).into_response(),
        Err(e) => e.into_response(),
    }
}
