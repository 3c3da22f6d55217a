//! Export creation and status polling.

use super::state::{GuardedCoordinator, ServerState};
use super::ServerConfig;
use crate::export::{ExportError, ExportFormat, ExportKey, ExportKind, ExportRequest, ExportState};
use crate::publish::PublishError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Deserialize, Debug)]
struct CreateExportBody {
    #[serde(default)]
    subject_id: i64,
    #[serde(default)]
    width: i64,
    height: Option<i64>,
    page: Option<i64>,
    format: Option<String>,
}

#[derive(Serialize)]
struct CreateExportResponse {
    key: String,
}

#[derive(Deserialize, Debug)]
pub(super) struct StatusQuery {
    pub key: Option<String>,
    pub continuation: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(super) fn export_error_response(err: ExportError) -> Response {
    match err {
        ExportError::ArtifactMissing(_) => error_response(StatusCode::NOT_FOUND, err),
        ExportError::Destination(PublishError::NotConfigured(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, err)
        }
        ExportError::Internal(_) => {
            error!("Export request failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
        err => error_response(StatusCode::BAD_REQUEST, err),
    }
}

fn parse_kind(kind: &str) -> Result<ExportKind, Response> {
    kind.parse::<ExportKind>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

async fn create_export(
    State(config): State<ServerConfig>,
    State(coordinator): State<GuardedCoordinator>,
    Path(kind): Path<String>,
    Json(body): Json<CreateExportBody>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    if !config.exports_enabled {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "no renderer configured");
    }
    let format = match body.format.as_deref().map(str::parse::<ExportFormat>) {
        None => None,
        Some(Ok(format)) => Some(format),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let request = ExportRequest {
        kind,
        subject_id: body.subject_id,
        width: body.width,
        height: body.height,
        page: body.page,
        format,
    };
    match coordinator.create(&request) {
        Ok(key) => Json(CreateExportResponse {
            key: key.to_string(),
        })
        .into_response(),
        Err(err) => export_error_response(err),
    }
}

async fn export_status(
    State(coordinator): State<GuardedCoordinator>,
    Path(kind): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    if let Err(response) = parse_kind(&kind) {
        return response;
    }
    let key = match ExportKey::parse(query.key.as_deref()) {
        Ok(key) => key,
        Err(e) => {
            warn!("Status poll with bad key {:?}: {}", query.key, e);
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    match coordinator.status(&key, query.continuation.as_deref()) {
        Ok(report) => {
            let status = if report.status == ExportState::NotFound {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            (status, Json(report)).into_response()
        }
        Err(err) => export_error_response(err),
    }
}

pub fn make_export_routes(state: ServerState) -> Router {
    Router::new()
        .route("/{kind}/create", post(create_export))
        .route("/{kind}/status", get(export_status))
        .with_state(state)
}
