//! HTTP surface for a UI collaborator.
//!
//! `POST /api/analyze` takes the raw image as the request body (its
//! `Content-Type` is the image MIME type). `GET /api/state` exposes the
//! current pipeline state. Failures carry a category message only.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::analysis::{
    AnalysisOrchestrator, AnalysisResult, ErrorKind, ImageCandidate, PipelineState, SubmitError,
};
use crate::config::Config;

/// Extra body allowance so oversize uploads reach the validator and get a
/// proper message instead of a bare 413.
const BODY_SLACK_BYTES: usize = 1024 * 1024;

pub struct Server {
    config: Config,
    orchestrator: Arc<AnalysisOrchestrator>,
}

struct AppState {
    config: Config,
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl Server {
    pub fn new(config: &Config, orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            config: config.clone(),
            orchestrator,
        }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            orchestrator: self.orchestrator.clone(),
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let body_limit = self.config.upload.max_file_size_bytes as usize + BODY_SLACK_BYTES;

        Router::new()
            .route("/health", get(health_check))
            .route("/api/status", get(status))
            .route("/api/state", get(pipeline_state))
            .route("/api/analyze", post(analyze))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(state)
    }

    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr =
            format!("{}:{}", self.config.server.bind, self.config.server.port).parse()?;

        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

// Error response type
struct AppError(StatusCode, ErrorBody);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
    hint: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        let status = match kind {
            ErrorKind::Empty | ErrorKind::TooLarge | ErrorKind::UnsupportedType => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Model | ErrorKind::SyntaxViolation | ErrorKind::SchemaViolation => {
                StatusCode::BAD_GATEWAY
            }
        };
        AppError(
            status,
            ErrorBody {
                error: kind.as_str(),
                message: kind.user_message(),
                hint: kind.next_step(),
            },
        )
    }
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    model: String,
    max_file_size_bytes: u64,
    state: &'static str,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config.model.name.clone(),
        max_file_size_bytes: state.config.upload.max_file_size_bytes,
        state: state.orchestrator.state().label(),
    })
}

/// What the presentation layer sees of a [`PipelineState`].
#[derive(Debug, Serialize, PartialEq)]
pub struct StateView {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<PipelineState> for StateView {
    fn from(state: PipelineState) -> Self {
        let label = state.label();
        let (result, error, message) = match state {
            PipelineState::Succeeded(result) => (Some(result), None, None),
            PipelineState::Failed(kind) => (None, Some(kind), Some(kind.user_message())),
            _ => (None, None, None),
        };
        StateView {
            state: label,
            result,
            error,
            message,
        }
    }
}

async fn pipeline_state(State(state): State<Arc<AppState>>) -> Json<StateView> {
    Json(state.orchestrator.state().into())
}

#[derive(Deserialize)]
struct AnalyzeQuery {
    name: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    message: &'static str,
    result: AnalysisResult,
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyzeQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let candidate = if body.is_empty() {
        None
    } else {
        let name = query.name.unwrap_or_else(|| "upload".to_string());
        Some(ImageCandidate::from_bytes(name, mime_type, body.to_vec()))
    };

    // Spawned so a dropped connection cannot abandon an analysis mid-flight.
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move { orchestrator.submit(candidate).await }).await;

    match outcome {
        Ok(Ok(result)) => Json(AnalyzeResponse {
            message: "Analysis complete!",
            result,
        })
        .into_response(),
        Ok(Err(SubmitError::Busy)) => AppError(
            StatusCode::CONFLICT,
            ErrorBody {
                error: "busy",
                message: "An analysis is already in progress.",
                hint: "Try again.",
            },
        )
        .into_response(),
        Ok(Err(SubmitError::Failed(e))) => AppError::from(e.kind()).into_response(),
        Err(e) => {
            error!("Analysis task panicked: {}", e);
            AppError(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "internal",
                    message: "Failed to analyze image.",
                    hint: "Try again.",
                },
            )
            .into_response()
        }
    }
}
