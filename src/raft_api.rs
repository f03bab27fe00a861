use crate::replicator::{NodeIdType, RaftEngine, TypeConfig};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;

/// Consensus RPC endpoints, served on the node's consensus address.
pub fn create_raft_router(engine: Arc<RaftEngine>) -> Router {
    Router::new()
        .route("/raft/vote", post(handle_vote))
        .route("/raft/append_entries", post(handle_append_entries))
        .route("/raft/install_snapshot", post(handle_install_snapshot))
        .with_state(engine)
}

fn rpc_response<T: Serialize, E: Display>(result: Result<T, E>) -> axum::response::Response {
    match result {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn handle_vote(
    State(engine): State<Arc<RaftEngine>>,
    Json(req): Json<VoteRequest<NodeIdType>>,
) -> impl IntoResponse {
    rpc_response(engine.raft().vote(req).await)
}

async fn handle_append_entries(
    State(engine): State<Arc<RaftEngine>>,
    Json(req): Json<AppendEntriesRequest<TypeConfig>>,
) -> impl IntoResponse {
    rpc_response(engine.raft().append_entries(req).await)
}

async fn handle_install_snapshot(
    State(engine): State<Arc<RaftEngine>>,
    Json(req): Json<InstallSnapshotRequest<TypeConfig>>,
) -> impl IntoResponse {
    rpc_response(engine.raft().install_snapshot(req).await)
}
