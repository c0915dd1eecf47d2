//! HTTP API: resume upload and health checks.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use formpilot_resume::{ResumeData, ResumePipeline};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::Config;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ResumePipeline>,
}

/// Error body `{"detail": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<formpilot_resume::Error> for ApiError {
    fn from(e: formpilot_resume::Error) -> Self {
        use formpilot_resume::Error as E;
        let status = match e {
            E::NotAPdf(_) | E::ExtractionFailed(_) => StatusCode::BAD_REQUEST,
            E::SchemaParseFailed { .. } | E::Llm(_) | E::Http(_) => StatusCode::BAD_GATEWAY,
            E::Json(_) | E::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Resume parsing failed: {}", self.detail);
        } else {
            warn!("Rejected upload: {}", self.detail);
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Build the API router.
pub fn router(pipeline: Arc<ResumePipeline>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/parse-resume", post(parse_resume))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Resume Parser API is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "resume-parser" }))
}

async fn parse_resume(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ResumeData>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("could not read upload: {}", e)))?;

        info!("Parsing uploaded resume {} ({} bytes)", file_name, bytes.len());
        let resume = state.pipeline.run(&file_name, bytes.to_vec()).await?;
        return Ok(Json(resume));
    }
    Err(ApiError::bad_request("missing multipart field 'file'"))
}

/// Serve the API until the process is stopped.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(ResumePipeline::new(
        config.llm.clone(),
        config.resume.clone(),
    )?);
    let app = router(pipeline, config.server.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Resume Parser API listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
