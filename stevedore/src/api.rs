//! Control API.
//!
//! Accepts staging and start requests while the agent is running; once
//! shutdown or evacuation has begun, new work is refused with 503 so the
//! placer retries elsewhere. Accepted requests are handed off and
//! acknowledged immediately; progress is reported out of band.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use crate::lifecycle::Lifecycle;

/// Executes accepted staging and start requests.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    async fn stage(&self, request: Value);
    async fn start_app(&self, request: Value);
}

#[derive(Clone)]
struct ApiState {
    lifecycle: Arc<Lifecycle>,
    handler: Arc<dyn ControlHandler>,
}

pub fn control_router(lifecycle: Arc<Lifecycle>, handler: Arc<dyn ControlHandler>) -> Router {
    Router::new()
        .route("/stage", post(stage))
        .route("/apps", post(start_app))
        .route("/healthz", get(healthz))
        .with_state(ApiState { lifecycle, handler })
}

async fn stage(State(state): State<ApiState>, Json(request): Json<Value>) -> impl IntoResponse {
    if !state.lifecycle.accepting_work() {
        return refuse();
    }
    tokio::spawn(async move { state.handler.stage(request).await });
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
}

async fn start_app(State(state): State<ApiState>, Json(request): Json<Value>) -> impl IntoResponse {
    if !state.lifecycle.accepting_work() {
        return refuse();
    }
    tokio::spawn(async move { state.handler.start_app(request).await });
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
}

async fn healthz() -> &'static str {
    "ok"
}

fn refuse() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "agent is not accepting work" })),
    )
}
