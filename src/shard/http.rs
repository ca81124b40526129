//! HTTP API of a worker node
//!
//! Mirrors the `ShardClient` operations one-to-one so `HttpShardClient` can
//! drive a remote `LocalShard`. Failures answer with the status from
//! `ShardError::to_http_status` and an `OperationError` body.

use crate::common::error::ShardError;
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::coordinator::model::{CollectionDefinition, OperationError};
use crate::coordinator::shard_client::{NodeResources, ShardClient, ShardInfo};
use crate::shard::local::LocalShard;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct WorkerState {
    pub shard: Arc<LocalShard>,
}

struct ShardApiError(ShardError);

impl From<ShardError> for ShardApiError {
    fn from(e: ShardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ShardApiError {
    fn into_response(self) -> Response {
        let status = self.0.to_http_status();
        (status, Json(OperationError::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ShardApiError>;

pub fn create_router(state: WorkerState) -> Router {
    Router::new()
        .route("/shard/ping", get(ping))
        .route("/shard/resources", get(resources))
        .route("/shard/collections", post(create_collection))
        .route(
            "/shard/collections/:name",
            get(collection_info).delete(delete_collection),
        )
        .route("/shard/collections/:name/load", post(load_collection))
        .route("/shard/collections/:name/release", post(release_collection))
        .route("/health/live", get(health_live))
        .layer(middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping(State(state): State<WorkerState>) -> ApiResult<serde_json::Value> {
    state.shard.ping().await?;
    Ok(Json(json!({ "node_id": state.shard.node_id() })))
}

async fn resources(State(state): State<WorkerState>) -> ApiResult<NodeResources> {
    Ok(Json(state.shard.resources().await?))
}

async fn create_collection(
    State(state): State<WorkerState>,
    Json(definition): Json<CollectionDefinition>,
) -> ApiResult<ShardInfo> {
    let info = state.shard.create(&definition).await?;
    tracing::info!(collection = %definition.name, dim = definition.dim, "Created shard");
    Ok(Json(info))
}

async fn collection_info(
    State(state): State<WorkerState>,
    Path(name): Path<String>,
) -> ApiResult<ShardInfo> {
    Ok(Json(state.shard.info(&name).await?))
}

async fn delete_collection(
    State(state): State<WorkerState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ShardApiError> {
    state.shard.delete(&name).await?;
    tracing::info!(collection = %name, "Deleted shard");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_collection(
    State(state): State<WorkerState>,
    Path(name): Path<String>,
) -> ApiResult<ShardInfo> {
    let info = state.shard.load(&name).await?;
    tracing::info!(collection = %name, memory = info.memory, "Loaded shard");
    Ok(Json(info))
}

async fn release_collection(
    State(state): State<WorkerState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ShardApiError> {
    state.shard.release(&name).await?;
    tracing::info!(collection = %name, "Released shard");
    Ok(StatusCode::NO_CONTENT)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "version": crate::VERSION,
    }))
}
