//! Routes the render provider talks to: sidecar consumption, artifact
//! upload and the direct publish hand-off.

use super::export_routes::{export_error_response, StatusQuery};
use super::state::{GuardedArtifactStore, GuardedCoordinator, ServerState};
use crate::export::ExportKey;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};
use uuid::Uuid;

const MAX_UPLOAD_SIZE: usize = 512 * 1024 * 1024;

#[derive(Deserialize, Debug)]
struct SidecarQuery {
    key: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    path: String,
}

async fn consume_sidecar(
    State(artifacts): State<GuardedArtifactStore>,
    Query(query): Query<SidecarQuery>,
) -> Response {
    let Some(path) = query.key.filter(|key| !key.trim().is_empty()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match artifacts.take_sidecar_for_path(&path) {
        Some(contents) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            contents,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Keep a client-supplied file name to a safe single path segment.
fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized.to_string()
    }
}

async fn upload(
    State(artifacts): State<GuardedArtifactStore>,
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Bad multipart body: {}", e))
                    .into_response()
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = format!(
            "{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(field.file_name().unwrap_or("upload"))
        );
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Failed to read upload: {}", e))
                    .into_response()
            }
        };

        let target: PathBuf = state.uploads_dir.join(&file_name);
        if let Err(e) = tokio::fs::create_dir_all(&state.uploads_dir).await {
            error!("Failed to create {:?}: {}", state.uploads_dir, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        if let Err(e) = tokio::fs::write(&target, &data).await {
            error!("Failed to store upload {:?}: {}", target, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        let relative = target
            .strip_prefix(artifacts.root())
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| file_name.clone());
        info!("Stored upload of {} bytes at {:?}", data.len(), target);
        return Json(UploadResponse { path: relative }).into_response();
    }

    (StatusCode::BAD_REQUEST, "Missing file field").into_response()
}

async fn continue_export(
    State(coordinator): State<GuardedCoordinator>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let key = match ExportKey::parse(query.key.as_deref()) {
        Ok(ExportKey::Present(key)) => key,
        Ok(ExportKey::Empty) => return (StatusCode::BAD_REQUEST, "Missing key").into_response(),
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let continuation = query.continuation.unwrap_or_default();

    match coordinator.request_publish(&key, &continuation) {
        Ok(()) => Json(json!({ "status": "publish" })).into_response(),
        Err(err) => export_error_response(err),
    }
}

pub fn make_provider_routes(state: ServerState) -> Router {
    Router::new()
        .route("/status", get(consume_sidecar))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/continue", get(continue_export))
        .with_state(state)
}
