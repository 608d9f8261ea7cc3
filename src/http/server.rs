use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    core::{
        domain::ExecutionRequest,
        pipeline::polling::{PollOrchestrator, RunError},
    },
    http::models::{RunRequestDto, RunResponseDto},
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("POST only")]
    MethodNotAllowed,
    #[error(transparent)]
    Run(#[from] RunError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Run(e) if e.is_user_error() => StatusCode::BAD_REQUEST,
            ApiError::Run(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Run failed: {}", self);
        } else {
            tracing::warn!("Rejected request: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `POST /api/run` runs a program on the remote judge and answers with the
/// normalized result.
pub fn build_router(orchestrator: Arc<PollOrchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route(
            "/api/run",
            post(run_handler)
                .options(|| async { StatusCode::OK })
                .fallback(|| async { ApiError::MethodNotAllowed }),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

#[tracing::instrument(skip_all)]
async fn run_handler(
    State(orchestrator): State<Arc<PollOrchestrator>>,
    payload: Result<Json<RunRequestDto>, JsonRejection>,
) -> Result<Json<RunResponseDto>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = ExecutionRequest::from(payload);
    tracing::info!("Run requested for language {}", request.language_key);

    let result = orchestrator.run(&request).await?;

    Ok(Json(RunResponseDto::from((request.language_key, result))))
}

pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Control plane listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down control plane"),
        Err(e) => {
            tracing::error!("Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
