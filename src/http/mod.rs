//! HTTP transport: router, handlers, and wire mapping.
//!
//! Routes the reference HTTP binding onto the orchestrator and renders
//! [`PullOutcome`] values as status codes, headers, and bodies. Collaborator
//! failures surface as an opaque 500 without leaking internal detail.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::orchestrator::{PullOutcome, StreamOrchestrator};
use crate::slots::MAX_THREAD_SLOTS;
use crate::{AppError, Result};

pub mod identity;

use identity::IdentityVerifier;

/// Response header carrying the continuation token.
const HEADER_PULL_NEXT: HeaderName = HeaderName::from_static("pi-pull-next");
/// Response header advertising the assigned slot as `N/6`.
const HEADER_THREAD_SLOT: HeaderName = HeaderName::from_static("pi-thread-slot");
/// Correlation-id header, honored when supplied and generated otherwise.
const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
/// Caller-supplied identity used as the semaphore lease key.
const HEADER_CLIENT_ID: HeaderName = HeaderName::from_static("x-client-id");

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Protocol state machine.
    pub orchestrator: Arc<StreamOrchestrator>,
    /// Identity-verification capability.
    pub identity: IdentityVerifier,
}

/// Build the application router with all middleware attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/out/{ispb}/stream/start", get(start_stream))
        .route("/api/v1/out/{ispb}/stream/{pi_pull_next}", get(next_batch))
        .route("/admin/thread-slots/{ispb}/release", post(release_slot))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            identity::require_identity,
        ))
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns `AppError::Io` if the bind or the server itself fails.
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind {addr}: {err}")))?;
    info!(%addr, "http server listening");
    run(listener, state, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn run<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| AppError::Io(format!("http server failed: {err}")))
}

/// Handler for `GET /health`.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
        "env": state.config.environment,
    }))
}

/// Handler for `GET /api/v1/out/{ispb}/stream/start`.
async fn start_stream(
    State(state): State<AppState>,
    Path(ispb): Path<String>,
    headers: HeaderMap,
) -> Response {
    let caller_id = caller_id(&headers);
    match state.orchestrator.start(&ispb, &caller_id).await {
        Ok(outcome) => render_outcome(outcome),
        Err(err) => internal_error(&err),
    }
}

/// Handler for `GET /api/v1/out/{ispb}/stream/{pi_pull_next}`.
async fn next_batch(
    State(state): State<AppState>,
    Path((ispb, pi_pull_next)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let caller_id = caller_id(&headers);
    match state
        .orchestrator
        .next(&ispb, &pi_pull_next, &caller_id)
        .await
    {
        Ok(outcome) => render_outcome(outcome),
        Err(err) => internal_error(&err),
    }
}

/// Request body for the admin release endpoint.
#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    client_id: String,
}

/// Handler for `POST /admin/thread-slots/{ispb}/release`.
async fn release_slot(
    State(state): State<AppState>,
    Path(ispb): Path<String>,
    Json(body): Json<ReleaseRequest>,
) -> Response {
    match state.orchestrator.release(&ispb, &body.client_id).await {
        Ok(()) => Json(json!({"status": "released"})).into_response(),
        Err(err) => internal_error(&err),
    }
}

/// Fallback handler for unknown routes.
async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"code": "NOT_FOUND", "message": "Resource not found"})),
    )
        .into_response()
}

/// Map a protocol outcome onto the wire.
fn render_outcome(outcome: PullOutcome) -> Response {
    match outcome {
        PullOutcome::Delivered {
            slot,
            token,
            content_type,
            body,
        } => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (HEADER_PULL_NEXT, token),
                (HEADER_THREAD_SLOT, slot_header(slot)),
            ],
            body,
        )
            .into_response(),
        PullOutcome::NoContent { slot } => (
            StatusCode::NO_CONTENT,
            [(HEADER_THREAD_SLOT, slot_header(slot))],
        )
            .into_response(),
        PullOutcome::Exhausted {
            retry_after_seconds,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            [
                (header::RETRY_AFTER, retry_after_seconds.to_string()),
                (
                    HEADER_THREAD_SLOT,
                    format!("{MAX_THREAD_SLOTS}/{MAX_THREAD_SLOTS}"),
                ),
            ],
            Json(json!({
                "code": "THREAD_LIMIT",
                "message": "Six concurrent threads allowed per ISPB",
            })),
        )
            .into_response(),
        PullOutcome::InvalidToken { reason } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "INVALID_PI_PULL_NEXT",
                "message": reason.to_string(),
            })),
        )
            .into_response(),
    }
}

/// Render a collaborator failure as an opaque internal error.
fn internal_error(err: &AppError) -> Response {
    error!(%err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "code": "INTERNAL_SERVER_ERROR",
            "message": "Unexpected error",
        })),
    )
        .into_response()
}

fn slot_header(slot: u8) -> String {
    format!("{slot}/{MAX_THREAD_SLOTS}")
}

/// Resolve the semaphore lease key for a request: the caller-supplied
/// `x-client-id`, else the request correlation id, else a fresh UUID.
fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_CLIENT_ID)
        .or_else(|| headers.get(HEADER_REQUEST_ID))
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned)
}

/// Middleware assigning a correlation id to every request and echoing it on
/// the response.
async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

    let Ok(value) = HeaderValue::from_str(&id) else {
        return next.run(req).await;
    };

    req.headers_mut().insert(HEADER_REQUEST_ID, value.clone());
    let mut response = next.run(req).await;
    response.headers_mut().insert(HEADER_REQUEST_ID, value);
    response
}
