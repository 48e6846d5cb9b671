use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tower::ServiceBuilder;

use codehive_collab::CollabHub;
use codehive_core::WorkspaceId;
use codehive_jobs::{Dispatcher, JobStore, JobStoreError, Submission};

use crate::context::RequesterContext;
use crate::directory::WorkspaceDirectory;

/// Store behind a trait object so in-memory and Postgres share one wiring.
pub type SharedStore = Arc<dyn JobStore>;

#[derive(Clone)]
pub struct AppServices {
    dispatcher: Arc<Dispatcher<SharedStore>>,
    hub: Arc<CollabHub>,
    directory: Arc<dyn WorkspaceDirectory>,
}

impl AppServices {
    pub fn new(
        dispatcher: Arc<Dispatcher<SharedStore>>,
        hub: Arc<CollabHub>,
        directory: Arc<dyn WorkspaceDirectory>,
    ) -> Self {
        Self {
            dispatcher,
            hub,
            directory,
        }
    }

    pub fn hub(&self) -> &CollabHub {
        &self.hub
    }
}

pub fn build_app(services: AppServices) -> Router {
    let services = Arc::new(services);

    Router::new()
        .route("/health", get(health))
        .route(
            "/workspaces/:workspace_id/jobs",
            post(submit_job).get(list_jobs),
        )
        .route("/ws", get(crate::ws::ws_upgrade))
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(
            crate::middleware::requester_middleware,
        ))
        .layer(ServiceBuilder::new())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobRequest {
    input: JsonValue,
    idempotency_key: String,
}

async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(requester): Extension<RequesterContext>,
    Path(workspace_id): Path<i64>,
    Json(body): Json<SubmitJobRequest>,
) -> axum::response::Response {
    let workspace_id = WorkspaceId::new(workspace_id);

    if !requester.can_submit() {
        return json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("role '{}' may not submit jobs", requester.role().as_str()),
        );
    }
    if !services.directory.contains(workspace_id) {
        return json_error(StatusCode::NOT_FOUND, "not_found", "workspace not found");
    }
    if !body.input.is_object() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "input must be a JSON object",
        );
    }
    if body.idempotency_key.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "idempotencyKey must be a non-empty string",
        );
    }

    // The dispatcher blocks on the store; keep it off the async workers.
    let dispatcher = services.dispatcher.clone();
    let input = body.input;
    let key = body.idempotency_key;
    let submitted =
        tokio::task::spawn_blocking(move || dispatcher.submit(workspace_id, input, &key)).await;

    match submitted {
        Ok(Ok(Submission::Accepted(job))) => (StatusCode::ACCEPTED, Json(job)).into_response(),
        Ok(Ok(Submission::Existing(job))) => (StatusCode::OK, Json(job)).into_response(),
        Ok(Err(e)) => store_error_to_response(e),
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
    }
}

async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(workspace_id): Path<i64>,
) -> axum::response::Response {
    let workspace_id = WorkspaceId::new(workspace_id);

    if !services.directory.contains(workspace_id) {
        return json_error(StatusCode::NOT_FOUND, "not_found", "workspace not found");
    }

    let dispatcher = services.dispatcher.clone();
    let listed = tokio::task::spawn_blocking(move || dispatcher.list_jobs(workspace_id)).await;

    match listed {
        Ok(Ok(jobs)) => (StatusCode::OK, Json(jobs)).into_response(),
        Ok(Err(e)) => store_error_to_response(e),
        Err(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            e.to_string(),
        ),
    }
}

fn store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        JobStoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        JobStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
