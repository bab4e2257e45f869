//! `/api/chat` over axum
//!
//! One POST route carrying the tagged request union, plus a liveness probe.
//! Handlers are thin: parse, dispatch to [`Experiment`], map the error kind
//! to a status code. No state survives a request.

use armseal_core::{parse_request, ErrorBody, Experiment, ExperimentError};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared, read-only handler state
#[derive(Debug, Clone)]
pub struct AppState {
    experiment: Arc<Experiment>,
}

impl AppState {
    #[must_use]
    pub fn new(experiment: Arc<Experiment>) -> Self {
        Self { experiment }
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/healthz", get(healthz))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c
///
/// # Errors
/// Returns error if the listener cannot be bound or the server fails
pub async fn serve(addr: SocketAddr, state: AppState, max_body_bytes: usize) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state, max_body_bytes))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(err) => return error_response(&err, "unparsed"),
    };
    let kind = request.kind();
    match state.experiment.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => error_response(&err, kind),
    }
}

fn error_response(err: &ExperimentError, request: &'static str) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        ExperimentError::Internal(detail) => {
            tracing::error!(request, detail = %detail, "internal error");
        }
        _ if err.is_client_error() => {
            tracing::warn!(request, kind = err.kind(), "request rejected");
        }
        // Upstream failures are logged where the model call fails.
        _ => {}
    }
    (status, Json(ErrorBody::from(err))).into_response()
}
