//! Path: crates/fraud-ingest/src/handlers.rs
//! HTTP handlers for the ingestion endpoint and the transaction
//! read/review surface (§6).
use crate::pipeline::{self, IngestRequest};
use crate::state::AppState;
use crate::AppError;
use axum::extract::{Path, Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::Json;
use fraud_store::transactions::{ListFilter, SortOrder};
use fraud_types::model::{Transaction, TransactionStatus};
use std::collections::HashMap;

fn infra(e: fraud_types::error::TransientInfrastructureError) -> AppError {
    AppError::Internal(anyhow::anyhow!(e))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /api/transactions/stream/`: the ingestion pipeline's entry point.
/// Enforces `Content-Type: application/json` (415) before delegating.
pub async fn stream_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let content_type = header_str(&headers, CONTENT_TYPE.as_str()).unwrap_or("");
    if !content_type.starts_with("application/json") {
        return Err(AppError::UnsupportedMediaType(format!(
            "expected application/json, got {content_type:?}"
        )));
    }
    let body: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;

    let idempotency_key = header_str(&headers, "idempotency-key")
        .map(str::to_string)
        .or_else(|| params.get("idempotency_key").cloned());
    let reprocess_raw = header_str(&headers, "x-reprocess")
        .map(str::to_string)
        .or_else(|| params.get("reprocess").cloned());

    let response = pipeline::run(
        &state,
        IngestRequest {
            body,
            idempotency_key,
            reprocess_raw,
        },
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

fn parse_sort(raw: &str) -> Option<SortOrder> {
    match raw {
        "date_asc" => Some(SortOrder::DateAsc),
        "date_desc" => Some(SortOrder::DateDesc),
        "amount_asc" => Some(SortOrder::AmtAsc),
        "amount_desc" => Some(SortOrder::AmtDesc),
        _ => None,
    }
}

fn parse_status(raw: &str) -> Option<TransactionStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "processed" => Some(TransactionStatus::Processed),
        "alerted" => Some(TransactionStatus::Alerted),
        _ => None,
    }
}

/// `GET /api/transactions/`: paginated listing with status filter, a
/// correlation-id substring search, and four sort orders.
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let page: i64 = params.get("page").and_then(|v| v.parse().ok()).unwrap_or(0).max(0);
    let page_size: i64 = params.get("page_size").and_then(|v| v.parse().ok()).unwrap_or(50).clamp(1, 1000);
    let filter = ListFilter {
        status: params.get("status").and_then(|v| parse_status(v)),
        search: params.get("search").cloned().filter(|s| !s.is_empty()),
        sort: params.get("sort").and_then(|v| parse_sort(v)),
        page,
        page_size,
    };
    let transactions = fraud_store::transactions::list(&state.db, &filter).await.map_err(infra)?;
    Ok(Json(transactions))
}

/// `GET /api/transactions/<cid>/`.
pub async fn get_transaction(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Json<Transaction>, AppError> {
    fraud_store::transactions::get_by_correlation_id(&state.db, &cid)
        .await
        .map_err(infra)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no transaction with correlation_id {cid}")))
}

#[derive(serde::Deserialize)]
pub struct UpdateReviewBody {
    pub is_fraud: Option<bool>,
    pub is_reviewed: Option<bool>,
}

/// `PUT /api/transactions/<cid>/status/`: operator review flags.
pub async fn update_transaction_status(
    State(state): State<AppState>,
    Path(cid): Path<String>,
    Json(body): Json<UpdateReviewBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let rows = fraud_store::transactions::update_review_flags(&state.db, &cid, body.is_fraud, body.is_reviewed)
        .await
        .map_err(infra)?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("no transaction with correlation_id {cid}")));
    }
    Ok(Json(serde_json::json!({ "updated": rows })))
}

/// `POST /api/transactions/<cid>/ml-probability/` (§11 supplemented
/// endpoint): the ML cache lookup behind §4.3.3's two-step contract,
/// surfaced so operators can inspect a cached score without waiting for the
/// worker's next pass.
pub async fn ml_probability(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    let tx = fraud_store::transactions::get_by_correlation_id(&state.db, &cid)
        .await
        .map_err(infra)?
        .ok_or_else(|| AppError::NotFound(format!("no transaction with correlation_id {cid}")))?;
    let mut kv = fraud_stream::KvClient::new(state.redis.clone());
    let probability = kv.ml_probability(&tx.transaction_id).await.map_err(infra)?;
    Ok(Json(serde_json::json!({ "ml_probability": probability })))
}
