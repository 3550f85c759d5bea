//! Path: crates/fraud-worker/src/alert.rs
//! Builds and dedup-enqueues one alert per triggered transaction (§4.4).
//! The worker, not the dispatcher, owns payload construction and dedup —
//! the dispatcher only drains `alerts_queue` and POSTs.
use fraud_rules::EvaluationOutcome;
use fraud_stream::{KvClient, QueueClient};
use fraud_types::model::Transaction;
use rust_decimal::prelude::ToPrimitive;
use sha1::{Digest, Sha1};

fn payload(tx: &Transaction, outcome: &EvaluationOutcome, frontend_base_url: &str) -> serde_json::Value {
    let rules_triggered: Vec<String> = outcome
        .triggered
        .iter()
        .map(|t| format!("{} ({})", t.title, t.reason))
        .collect();
    serde_json::json!({
        "transaction_id": tx.transaction_id,
        "correlation_id": tx.correlation_id,
        "sender_account": tx.sender_account,
        "receiver_account": tx.receiver_account,
        "amount": tx.amount.to_f64().unwrap_or(0.0),
        "timestamp": tx.timestamp.to_rfc3339(),
        "rules_triggered": rules_triggered,
        "ml_probability": serde_json::Value::Null,
        "transaction_link": format!("{frontend_base_url}?correlation_id={}", tx.correlation_id),
        "criticality": outcome.max_criticality.as_str(),
    })
}

/// Builds the alert payload, dedups on its SHA-1, and — unless an identical
/// alert was already dispatched within `webhook_dedup_ttl` — pushes it onto
/// `alerts_queue` and fans it out (best-effort) onto `tg_alert_queue`.
pub async fn enqueue(
    kv: &mut KvClient,
    queues: &mut QueueClient,
    tx: &Transaction,
    outcome: &EvaluationOutcome,
    frontend_base_url: &str,
    webhook_dedup_ttl: u64,
) -> Result<bool, fraud_types::error::TransientInfrastructureError> {
    let body = payload(tx, outcome, frontend_base_url);
    let canonical = serde_json::to_string(&body).unwrap_or_default();
    let hash = hex::encode(Sha1::digest(canonical.as_bytes()));

    let already_sent = kv.alert_dedup_check_and_set(&hash, webhook_dedup_ttl).await?;
    if already_sent {
        fraud_telemetry::dispatch_metrics().inc_alerts_deduped();
        return Ok(false);
    }

    queues.push_alert(&body).await?;

    let criticality = outcome.max_criticality.as_str();
    let reason = outcome
        .triggered
        .first()
        .map(|t| t.reason.as_str())
        .unwrap_or_default();
    if let Err(e) = queues
        .push_telegram_alert(&[
            ("txid", tx.transaction_id.as_str()),
            ("amount", &tx.amount.to_string()),
            ("sender", tx.sender_account.as_str()),
            ("receiver", tx.receiver_account.as_str()),
            ("criticality", criticality),
            ("reason", reason),
        ])
        .await
    {
        tracing::warn!(target: "fraud_worker", error = %e, transaction_id = %tx.transaction_id, "telegram fan-out enqueue failed");
    }

    Ok(true)
}
