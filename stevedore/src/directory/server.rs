//! HTTP surface of the directory server.
//!
//! Two routes, one for instance working directories and one for staging
//! task container mounts. Every request walks the same gauntlet: digest,
//! expiry, subject lookup, directory availability, file existence,
//! containment. The first failure wins and maps to a distinct status.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as RoutePath, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use crate::registry::{InstanceLookup, TaskLookup};

use super::codec::{UrlSigner, VerifyError};

/// Serves signed file-access URLs for instances and staging tasks.
pub struct DirectoryServer {
    signer: Arc<UrlSigner>,
    instances: Arc<dyn InstanceLookup>,
    tasks: Arc<dyn TaskLookup>,
}

#[derive(Clone)]
struct ServerState(Arc<DirectoryServer>);

impl DirectoryServer {
    pub fn new(
        signer: Arc<UrlSigner>,
        instances: Arc<dyn InstanceLookup>,
        tasks: Arc<dyn TaskLookup>,
    ) -> Arc<Self> {
        Arc::new(Self {
            signer,
            instances,
            tasks,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/instance_paths/{instance_id}", get(instance_path))
            .route("/staging_tasks/{task_id}/file_path", get(staging_file_path))
            .with_state(ServerState(self.clone()))
    }

    // ========================================================================
    // Signed URL constructors
    // ========================================================================

    /// Signed path-and-query for a file under an instance's working dir.
    pub fn signed_instance_url(&self, instance_id: &str, file_path: &str) -> String {
        self.signed_instance_url_at(instance_id, file_path, unix_now())
    }

    pub fn signed_instance_url_at(
        &self,
        instance_id: &str,
        file_path: &str,
        timestamp: i64,
    ) -> String {
        let route = format!("/instance_paths/{instance_id}");
        self.signer.sign(&route, file_path, timestamp)
    }

    /// Signed path-and-query for a file under a staging task's container.
    pub fn signed_staging_url(&self, task_id: &str, file_path: &str) -> String {
        self.signed_staging_url_at(task_id, file_path, unix_now())
    }

    pub fn signed_staging_url_at(&self, task_id: &str, file_path: &str, timestamp: i64) -> String {
        let route = format!("/staging_tasks/{task_id}/file_path");
        self.signer.sign(&route, file_path, timestamp)
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// Request pipeline
// ============================================================================

enum DirectoryError {
    /// Digest verification failed; nothing about the request is trusted.
    Unauthorized,
    /// Signature valid but past the expiry window.
    Expired,
    /// Unknown subject or requested file not present.
    NotFound,
    /// Subject exists but its directory has not materialized yet.
    Unavailable,
    /// Resolved path escapes the subject's base directory.
    Forbidden,
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            DirectoryError::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid url signature"),
            DirectoryError::Expired => (StatusCode::BAD_REQUEST, "url expired"),
            DirectoryError::NotFound => (StatusCode::NOT_FOUND, "entity not found"),
            DirectoryError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "directory unavailable")
            }
            DirectoryError::Forbidden => (StatusCode::FORBIDDEN, "path not accessible"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn instance_path(
    State(ServerState(server)): State<ServerState>,
    RoutePath(instance_id): RoutePath<String>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, DirectoryError> {
    check_signature(&server.signer, uri.path(), &params)?;

    let subject = server
        .instances
        .lookup_instance(&instance_id)
        .ok_or(DirectoryError::NotFound)?;
    let base = subject.working_dir.ok_or(DirectoryError::Unavailable)?;

    let resolved = resolve_file(&base, params.get("path").map(String::as_str)).await?;
    tracing::debug!(instance_id, path = %resolved.display(), "serving instance path");
    Ok(Json(json!({ "instance_path": resolved })))
}

async fn staging_file_path(
    State(ServerState(server)): State<ServerState>,
    RoutePath(task_id): RoutePath<String>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, DirectoryError> {
    check_signature(&server.signer, uri.path(), &params)?;

    let subject = server
        .tasks
        .lookup_task(&task_id)
        .ok_or(DirectoryError::NotFound)?;
    let base = subject.container_dir.ok_or(DirectoryError::Unavailable)?;

    let resolved = resolve_file(&base, params.get("path").map(String::as_str)).await?;
    tracing::debug!(task_id, path = %resolved.display(), "serving staging file path");
    Ok(Json(json!({ "instance_path": resolved })))
}

fn check_signature(
    signer: &UrlSigner,
    route_path: &str,
    params: &HashMap<String, String>,
) -> Result<(), DirectoryError> {
    match signer.verify(route_path, params, unix_now()) {
        Ok(()) => Ok(()),
        Err(VerifyError::DigestMismatch) => Err(DirectoryError::Unauthorized),
        Err(VerifyError::Expired) => Err(DirectoryError::Expired),
    }
}

/// Resolve `rel` under `base` with existence and containment checks.
///
/// Existence is checked before canonicalization so a dangling request
/// reads as missing-file, not as a traversal attempt. Containment uses
/// component-wise prefix comparison against the canonicalized base, which
/// rejects both `..` escapes through symlink resolution and sibling
/// directories that merely share a name prefix with the base.
async fn resolve_file(base: &Path, rel: Option<&str>) -> Result<PathBuf, DirectoryError> {
    let rel = rel.unwrap_or("");
    let candidate = base.join(rel);

    if tokio::fs::metadata(&candidate).await.is_err() {
        return Err(DirectoryError::NotFound);
    }

    let canonical_base = tokio::fs::canonicalize(base)
        .await
        .map_err(|_| DirectoryError::Unavailable)?;
    let canonical = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|_| DirectoryError::NotFound)?;

    if !canonical.starts_with(&canonical_base) {
        tracing::warn!(
            base = %canonical_base.display(),
            requested = %canonical.display(),
            "rejected path outside base directory"
        );
        return Err(DirectoryError::Forbidden);
    }
    Ok(canonical)
}
