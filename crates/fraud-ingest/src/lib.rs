#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
//! Path: crates/fraud-ingest/src/lib.rs
//! The HTTP ingestion service (§4.1): batch intake, validation,
//! deduplication, and per-mode routing onto the transactions stream, plus
//! the read/CRUD surface behind `/api/transactions/...` and `/api/rules/...`
//! (§6, §11 supplemented endpoints).

/// Application state shared across handlers: Redis connection manager,
/// Postgres pool, and the parsed `IngestConfig`.
pub mod state;
/// Request-body normalisation into a flat list (§4.1 step 1).
pub mod normalize;
/// Batch fingerprinting (§4.1 step 2, §9 "Batch fingerprint").
pub mod fingerprint;
/// Reprocess-mode selection (§4.1 step 3).
pub mod mode;
/// Chunked per-item validation and sanitisation (§4.1 steps 5-6).
pub mod validate;
/// The ingestion pipeline orchestrating steps 1-9 of §4.1.
pub mod pipeline;
/// HTTP handlers: ingestion, transaction read/review, rule CRUD, rule test.
pub mod handlers;
/// Per-rule-family CRUD request/response shapes and handlers.
pub mod rules_api;

use axum::{
    error_handling::HandleErrorLayer,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use axum::http::StatusCode;
use state::AppState;
use std::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// The ingestion service's unified handler error, mapped to the status
/// codes in §6's endpoint table.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    UnsupportedMediaType(String),
    PayloadTooLarge(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg, code) = match self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s, "BAD_REQUEST"),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s, "NOT_FOUND"),
            AppError::UnsupportedMediaType(s) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, s, "UNSUPPORTED_MEDIA_TYPE")
            }
            AppError::PayloadTooLarge(s) => (StatusCode::PAYLOAD_TOO_LARGE, s, "PAYLOAD_TOO_LARGE"),
            AppError::Internal(e) => {
                tracing::error!(target = "fraud_ingest", error = ?e, "internal error");
                fraud_telemetry::error_metrics().inc_error("ingest", "internal");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": { "code": code, "message": msg } })),
        )
            .into_response()
    }
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({ "error": { "code": "TIMEOUT", "message": "request timed out" } })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": { "code": "OVERLOADED", "message": err.to_string() } })),
        )
    }
}

/// Builds the ingestion service's router: `/api/transactions/...` and
/// `/api/rules/...`, layered with the teacher's
/// load-shed/concurrency-limit/timeout/trace/catch-panic stack.
pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/transactions/stream/", post(handlers::stream_transaction))
        .route("/api/transactions/", get(handlers::list_transactions))
        .route("/api/transactions/:cid/", get(handlers::get_transaction))
        .route("/api/transactions/:cid/status/", put(handlers::update_transaction_status))
        .route("/api/transactions/:cid/ml-probability/", post(handlers::ml_probability))
        .route(
            "/api/rules/threshold/",
            get(rules_api::list_threshold).post(rules_api::create_threshold),
        )
        .route(
            "/api/rules/threshold/:id/",
            put(rules_api::set_active_threshold).delete(rules_api::delete_threshold),
        )
        .route(
            "/api/rules/composite/",
            get(rules_api::list_composite).post(rules_api::create_composite),
        )
        .route(
            "/api/rules/composite/:id/",
            put(rules_api::set_active_composite).delete(rules_api::delete_composite),
        )
        .route(
            "/api/rules/pattern/",
            get(rules_api::list_pattern).post(rules_api::create_pattern),
        )
        .route(
            "/api/rules/pattern/:id/",
            put(rules_api::set_active_pattern).delete(rules_api::delete_pattern),
        )
        .route(
            "/api/rules/ml/",
            get(rules_api::list_ml).post(rules_api::create_ml),
        )
        .route("/api/rules/ml/:id/", put(rules_api::set_active_ml).delete(rules_api::delete_ml))
        .route("/api/rules/:kind/:id/test/", post(rules_api::test_rule))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .load_shed()
                .concurrency_limit(512)
                .timeout(Duration::from_secs(30)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
}
