//! HTTP surface built on axum. Three endpoints: health, export
//! download, and import upload. The acting user is the `x-user-id`
//! header; every data route requires it.

use crate::application::export::ExportService;
use crate::application::import::{ImportMode, ImportService, ImportSummary};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const USER_HEADER: &str = "x-user-id";

const WORKBOOK_FILE_NAME: &str = "focusdeck-export.workbook.json";
const ARCHIVE_FILE_NAME: &str = "focusdeck-export.archive.json";

#[derive(Clone)]
pub struct AppState {
    export: Arc<ExportService>,
    import: Arc<ImportService>,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            export: Arc::new(ExportService::new(Arc::clone(&store))),
            import: Arc::new(ImportService::new(store)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/export", get(get_export))
        .route("/import", post(post_import))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn start_server(host: &str, port: u16, state: AppState) -> Result<(), AppError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "focusdeck listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "ctrl-c handler failed");
        return;
    }
    tracing::info!("shutting down");
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

async fn get_export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let owner = owner_from_headers(&headers)?;
    let (body, file_name) = match query.format.as_deref().unwrap_or("workbook") {
        "workbook" => (state.export.export_workbook(&owner)?, WORKBOOK_FILE_NAME),
        "archive" => (state.export.export_archive(&owner)?, ARCHIVE_FILE_NAME),
        other => {
            return Err(AppError::Validation(format!(
                "unsupported export format '{other}'"
            )))
        }
    };
    let disposition = format!("attachment; filename=\"{file_name}\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, disposition.as_str()),
        ],
        body,
    )
        .into_response())
}

async fn post_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>, AppError> {
    let owner = owner_from_headers(&headers)?;
    let mut file: Option<Vec<u8>> = None;
    let mut mode: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::Validation(format!("malformed multipart request: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await.map_err(|error| {
                    AppError::Validation(format!("could not read the uploaded file: {error}"))
                })?;
                file = Some(bytes.to_vec());
            }
            "mode" => {
                let text = field.text().await.map_err(|error| {
                    AppError::Validation(format!("could not read the mode field: {error}"))
                })?;
                mode = Some(text);
            }
            _ => {}
        }
    }
    let file =
        file.ok_or_else(|| AppError::Validation("multipart field 'file' is required".to_string()))?;
    let mode = ImportMode::parse(mode.as_deref().unwrap_or("merge"))?;
    let summary = state.import.import(&owner, &file, mode)?;
    Ok(Json(summary))
}

fn owner_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .ok_or(AppError::AuthRequired)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = match code {
            "auth_required" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::UNPROCESSABLE_ENTITY,
            "already_active" | "queue_full" => StatusCode::CONFLICT,
            "network_error" | "external_api_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            message: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
