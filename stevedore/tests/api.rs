//! Control API admission tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use stevedore::api::{control_router, ControlHandler};
use stevedore::bus::{LoggingAdvertiser, LoggingBus};
use stevedore::lifecycle::{InstanceStopper, Lifecycle, LifecycleConfig};
use stevedore::registry::{Instance, InstanceRegistry, StagingRegistry, StagingTask};

#[derive(Default)]
struct RecordingHandler {
    staged: Mutex<Vec<Value>>,
    started: Mutex<Vec<Value>>,
}

#[async_trait]
impl ControlHandler for RecordingHandler {
    async fn stage(&self, request: Value) {
        self.staged.lock().push(request);
    }

    async fn start_app(&self, request: Value) {
        self.started.lock().push(request);
    }
}

struct NoopStopper;

#[async_trait]
impl InstanceStopper for NoopStopper {
    async fn stop_instance(&self, _instance: &Instance) {}
    async fn stop_task(&self, _task: &StagingTask) {}
}

fn lifecycle() -> Arc<Lifecycle> {
    Lifecycle::new(
        Arc::new(InstanceRegistry::new()),
        Arc::new(StagingRegistry::new()),
        Arc::new(LoggingBus),
        Arc::new(LoggingAdvertiser),
        Arc::new(NoopStopper),
        LifecycleConfig {
            evacuation_bail_out: Duration::from_secs(115),
        },
    )
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn accepts_work_while_running() {
    let lifecycle = lifecycle();
    let handler = Arc::new(RecordingHandler::default());
    let router = control_router(lifecycle, handler.clone());

    let response = router
        .clone()
        .oneshot(post_json("/stage", r#"{"task_id": "t-1"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = router
        .oneshot(post_json("/apps", r#"{"instance_id": "i-1"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Handlers run on spawned tasks; give them a beat to land.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handler.staged.lock().len(), 1);
    assert_eq!(handler.started.lock().len(), 1);
}

#[tokio::test]
async fn refuses_work_after_shutdown() {
    let lifecycle = lifecycle();
    let handler = Arc::new(RecordingHandler::default());
    let router = control_router(lifecycle.clone(), handler.clone());

    lifecycle.shutdown().await;

    let response = router
        .clone()
        .oneshot(post_json("/stage", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = router.oneshot(post_json("/apps", "{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(handler.staged.lock().is_empty());
    assert!(handler.started.lock().is_empty());
}

#[tokio::test]
async fn refuses_work_during_evacuation() {
    let lifecycle = lifecycle();
    let router = control_router(lifecycle.clone(), Arc::new(RecordingHandler::default()));

    lifecycle.evacuate().await;

    let response = router.oneshot(post_json("/apps", "{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn healthz_always_answers() {
    let lifecycle = lifecycle();
    let router = control_router(lifecycle.clone(), Arc::new(RecordingHandler::default()));
    lifecycle.shutdown().await;

    let response = router
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
