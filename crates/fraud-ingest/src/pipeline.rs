//! Path: crates/fraud-ingest/src/pipeline.rs
//! §4.1: the full ingestion pipeline, steps 1-9.
use crate::mode::{select_mode, Mode};
use crate::normalize::normalize;
use crate::state::AppState;
use crate::validate::{validate_chunked, MAX_ERROR_PREVIEWS};
use crate::AppError;
use chrono::Utc;
use fraud_stream::{KvClient, StreamClient};
use fraud_types::model::Transaction;
use std::collections::HashMap;

pub struct IngestRequest {
    pub body: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub reprocess_raw: Option<String>,
}

fn infra(e: fraud_types::error::TransientInfrastructureError) -> AppError {
    AppError::Internal(anyhow::anyhow!(e))
}

fn transaction_to_fields(tx: &Transaction) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    fields.insert("transaction_id".to_string(), tx.transaction_id.clone());
    fields.insert("correlation_id".to_string(), tx.correlation_id.clone());
    fields.insert("timestamp".to_string(), tx.timestamp.to_rfc3339());
    fields.insert("sender_account".to_string(), tx.sender_account.clone());
    fields.insert("receiver_account".to_string(), tx.receiver_account.clone());
    fields.insert("amount".to_string(), tx.amount.to_string());
    fields.insert("recalc".to_string(), if tx.recalc { "1" } else { "0" }.to_string());
    if let Some(t) = tx.transaction_type {
        fields.insert("transaction_type".to_string(), serde_json::to_value(t).unwrap_or_default().as_str().unwrap_or_default().to_string());
    }
    if let Some(d) = tx.device_used {
        fields.insert("device_used".to_string(), serde_json::to_value(d).unwrap_or_default().as_str().unwrap_or_default().to_string());
    }
    if let Some(v) = &tx.merchant_category {
        fields.insert("merchant_category".to_string(), v.clone());
    }
    if let Some(v) = &tx.location {
        fields.insert("location".to_string(), v.clone());
    }
    if let Some(v) = tx.time_since_last_transaction {
        fields.insert("time_since_last_transaction".to_string(), v.to_string());
    }
    if let Some(v) = tx.spending_deviation_score {
        fields.insert("spending_deviation_score".to_string(), v.to_string());
    }
    if let Some(v) = tx.velocity_score {
        fields.insert("velocity_score".to_string(), v.to_string());
    }
    if let Some(v) = tx.geo_anomaly_score {
        fields.insert("geo_anomaly_score".to_string(), v.to_string());
    }
    if let Some(v) = &tx.payment_channel {
        fields.insert("payment_channel".to_string(), v.clone());
    }
    if let Some(v) = tx.ip_address {
        fields.insert("ip_address".to_string(), v.to_string());
    }
    if let Some(v) = &tx.device_hash {
        fields.insert("device_hash".to_string(), v.clone());
    }
    fields
}

fn dedup_tokens(tx: &Transaction, dedup_keys: &[String]) -> Vec<String> {
    dedup_keys
        .iter()
        .filter_map(|field| {
            let value = match field.as_str() {
                "transaction_id" => Some(tx.transaction_id.clone()),
                "correlation_id" => Some(tx.correlation_id.clone()),
                _ => tx.field(field).and_then(|v| v.as_str().map(str::to_string)),
            };
            value.map(|v| KvClient::token_for(field, &v))
        })
        .collect()
}

/// Runs the full ingestion pipeline and returns the `202`-body JSON value.
pub async fn run(state: &AppState, req: IngestRequest) -> Result<serde_json::Value, AppError> {
    let config = &state.config;
    let mut kv = KvClient::new(state.redis.clone());
    let mut stream = StreamClient::new(state.redis.clone());

    // Step 1: normalise.
    let items = normalize(req.body)?;
    if items.len() > config.max_batch {
        return Err(AppError::PayloadTooLarge(format!(
            "batch of {} exceeds MAX_BATCH={}",
            items.len(),
            config.max_batch
        )));
    }

    // Step 2: fingerprint.
    let batch_fingerprint = crate::fingerprint::batch_fingerprint(&items);

    // Step 3: mode selection. Only a check here — the batch is marked seen
    // in step 9, after it has actually been appended to the stream, so a
    // batch that fails partway through remains re-submittable in normal
    // mode rather than being misrouted into auto/recalc on retry.
    let fingerprint_already_seen = kv
        .fingerprint_seen(&config.fpg_ns, &batch_fingerprint)
        .await
        .map_err(infra)?;
    let mode = select_mode(req.reprocess_raw.as_deref(), fingerprint_already_seen);

    // Step 4: idempotency lookup.
    if let Some(key) = &req.idempotency_key {
        if let Some(mut cached) = kv
            .idempotency_get(&config.idemp_ns, mode.as_str(), key)
            .await
            .map_err(infra)?
        {
            fraud_telemetry::ingest_metrics().inc_idempotency_hits();
            if let serde_json::Value::Object(ref mut map) = cached {
                if let Some(serde_json::Value::Object(idem)) = map.get_mut("idempotency") {
                    idem.insert("cached".to_string(), serde_json::Value::Bool(true));
                }
            }
            return Ok(cached);
        }
    }

    fraud_telemetry::ingest_metrics().inc_batches_received();
    fraud_telemetry::ingest_metrics().inc_items_received(items.len() as u64);

    // Steps 5-6: chunked validation + sanitisation.
    let now = Utc::now();
    let (mut valid, failures) = validate_chunked(&items, config.val_chunk, now);
    fraud_telemetry::ingest_metrics().inc_items_invalid(failures.len() as u64);

    // Step 7: per-mode routing.
    let dedup_dropped = match mode {
        Mode::Reprocess => {
            for tx in valid.iter_mut() {
                tx.recalc = true;
            }
            0
        }
        Mode::Normal => route_normal(&mut kv, config, &mut valid).await.map_err(infra)?,
        Mode::Auto => route_auto(&mut kv, &state.db, config, &mut valid).await?,
    };
    fraud_telemetry::ingest_metrics().inc_items_dedup_dropped(dedup_dropped as u64);

    // Ascending transaction_id order reduces lock contention on the
    // Transaction Store's later bulk insert (§5 ordering guarantee).
    valid.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));

    // Step 8: stream append.
    let entries: Vec<HashMap<String, String>> = valid.iter().map(transaction_to_fields).collect();
    stream
        .xadd_chunked(
            &config.tx_stream,
            &entries,
            config.xadd_chunk,
            config.stream_maxlen,
            config.trim_approx,
        )
        .await
        .map_err(infra)?;
    fraud_telemetry::ingest_metrics().inc_items_queued(entries.len() as u64);

    // Step 9 (part 1): the batch is only marked "seen" once its transactions
    // are durably queued — a failure above this line leaves it unseen so an
    // identical retry is still treated as a normal-mode resubmission.
    kv.fingerprint_record(&config.fpg_ns, &batch_fingerprint, config.fpg_ttl)
        .await
        .map_err(infra)?;

    let error_previews: Vec<serde_json::Value> = failures
        .iter()
        .take(MAX_ERROR_PREVIEWS)
        .map(|f| serde_json::json!({ "index": f.index, "error": f.error.to_string() }))
        .collect();

    let mut response = serde_json::json!({
        "summary": {
            "received": items.len(),
            "queued": entries.len(),
            "invalid": failures.len(),
            "dedup_dropped": dedup_dropped,
        },
        "idempotency": {
            "key_used": req.idempotency_key,
            "mode": mode.as_str(),
            "batch_fingerprint": batch_fingerprint,
        },
    });
    if !error_previews.is_empty() {
        response["errors"] = serde_json::Value::Array(error_previews);
    }

    // Step 9 (part 2): cache the response under the idempotency key.
    if let Some(key) = &req.idempotency_key {
        kv.idempotency_set(&config.idemp_ns, mode.as_str(), key, &response, config.idemp_ttl)
            .await
            .map_err(infra)?;
    }

    Ok(response)
}

/// Normal-mode routing: pass every item through the dedup filter, dropping
/// tokens already seen.
async fn route_normal(
    kv: &mut KvClient,
    config: &fraud_types::config::IngestConfig,
    valid: &mut Vec<Transaction>,
) -> Result<usize, fraud_types::error::TransientInfrastructureError> {
    if !config.use_dedup {
        return Ok(0);
    }
    let set_key = format!("{}:dedup", config.idemp_ns);
    let mut dropped = 0;
    let mut survivors = Vec::with_capacity(valid.len());
    for chunk in std::mem::take(valid).chunks(config.dedup_check_chunk.max(1)) {
        let tokens: Vec<Vec<String>> = chunk.iter().map(|tx| dedup_tokens(tx, &config.dedup_keys)).collect();
        let flat: Vec<String> = tokens.iter().flatten().cloned().collect();
        let seen = kv.dedup_check_and_insert(&set_key, &flat, config.dedup_ttl).await?;
        let mut cursor = 0usize;
        for (tx, toks) in chunk.iter().zip(tokens.iter()) {
            let n = toks.len();
            let item_seen = seen[cursor..cursor + n].iter().any(|s| *s);
            cursor += n;
            if item_seen {
                dropped += 1;
            } else {
                survivors.push(tx.clone());
            }
        }
    }
    *valid = survivors;
    Ok(dropped)
}

/// Auto-mode routing (§4.1 step 7): ids already present in the Transaction
/// Store are tagged `recalc` and pass through without dedup. Ids not yet
/// seen are dedup-checked, but unlike normal mode a dedup hit is a
/// re-submission, not a duplicate — it is promoted to `recalc` and kept
/// rather than dropped. Every item in the batch is appended; nothing is
/// ever dropped in auto mode.
async fn route_auto(
    kv: &mut KvClient,
    db: &sqlx::PgPool,
    config: &fraud_types::config::IngestConfig,
    valid: &mut Vec<Transaction>,
) -> Result<usize, AppError> {
    let ids: Vec<String> = valid.iter().map(|tx| tx.transaction_id.clone()).collect();
    let mut existing = std::collections::HashSet::new();
    for chunk in ids.chunks(config.lookup_chunk.max(1)) {
        let found = fraud_store::transactions::existing_ids(db, chunk)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        existing.extend(found);
    }

    let mut recalc_existing = Vec::new();
    let mut new_items = Vec::new();
    for mut tx in valid.drain(..) {
        if existing.contains(&tx.transaction_id) {
            tx.recalc = true;
            recalc_existing.push(tx);
        } else {
            new_items.push(tx);
        }
    }

    if config.use_dedup {
        let set_key = format!("{}:dedup", config.idemp_ns);
        for chunk_start in (0..new_items.len()).step_by(config.dedup_check_chunk.max(1)) {
            let end = (chunk_start + config.dedup_check_chunk.max(1)).min(new_items.len());
            let tokens: Vec<Vec<String>> = new_items[chunk_start..end]
                .iter()
                .map(|tx| dedup_tokens(tx, &config.dedup_keys))
                .collect();
            let flat: Vec<String> = tokens.iter().flatten().cloned().collect();
            let seen = kv
                .dedup_check_and_insert(&set_key, &flat, config.dedup_ttl)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
            let mut cursor = 0usize;
            for (tx, toks) in new_items[chunk_start..end].iter_mut().zip(tokens.iter()) {
                let n = toks.len();
                if seen[cursor..cursor + n].iter().any(|s| *s) {
                    tx.recalc = true;
                }
                cursor += n;
            }
        }
    }

    *valid = recalc_existing;
    valid.extend(new_items);
    Ok(0)
}
