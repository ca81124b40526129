//! HTTP API for the coordinator
//!
//! JSON over HTTP for the collection operations, the telemetry query and
//! liveness. Operation results always travel in the response envelope, so
//! handlers answer 200 even when `status` is false; only requests the
//! extractors cannot parse are rejected with a 4xx.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::coordinator::model::CollectionDefinition;
use crate::coordinator::service::{
    CollectionDetail, CollectionLists, CollectionName, CollectionResponse, CoordinatorService,
    GetCollections, Response, SystemInfo,
};
use axum::{
    extract::{Path, Query, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct CoordState {
    pub service: Arc<CoordinatorService>,
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/collections", post(create_collection).get(get_all_collections))
        .route(
            "/collections/:name",
            get(get_collection).delete(delete_collection),
        )
        .route("/collections/:name/load", post(load_collection))
        .route("/collections/:name/release", post(release_collection))
        .route("/resource", get(load_resource_info))
        // Kubernetes liveness probe
        .route("/health/live", get(health_live))
        .layer(middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping(State(state): State<CoordState>) -> Json<Response> {
    Json(state.service.ping())
}

async fn create_collection(
    State(state): State<CoordState>,
    Json(definition): Json<CollectionDefinition>,
) -> Json<CollectionResponse> {
    Json(state.service.create_collection(definition).await)
}

async fn get_all_collections(
    State(state): State<CoordState>,
    Query(query): Query<GetCollections>,
) -> Json<CollectionLists> {
    Json(state.service.get_all_collections(query).await)
}

async fn get_collection(
    State(state): State<CoordState>,
    Path(name): Path<String>,
    Query(query): Query<GetCollections>,
) -> Json<CollectionDetail> {
    let request = CollectionName {
        collection_name: name,
        with_size: query.with_size,
    };
    Json(state.service.get_collection(request).await)
}

async fn delete_collection(
    State(state): State<CoordState>,
    Path(name): Path<String>,
) -> Json<Response> {
    Json(state.service.delete_collection(name).await)
}

async fn load_collection(
    State(state): State<CoordState>,
    Path(name): Path<String>,
) -> Json<CollectionDetail> {
    Json(state.service.load_collection(name).await)
}

async fn release_collection(
    State(state): State<CoordState>,
    Path(name): Path<String>,
) -> Json<Response> {
    Json(state.service.release_collection(name).await)
}

async fn load_resource_info(State(state): State<CoordState>) -> Json<SystemInfo> {
    Json(state.service.load_resource_info())
}

async fn health_live(State(state): State<CoordState>) -> impl IntoResponse {
    let lifecycle = state.service.lifecycle();
    Json(json!({
        "alive": true,
        "version": crate::VERSION,
        "collections": lifecycle.registry().len(),
        "nodes": lifecycle.nodes().len(),
    }))
}
