//! Path: crates/fraud-worker/src/run.rs
//! The evaluation worker's main loop (SPEC_FULL.md §4.3 steps 1-10).
use crate::alert;
use crate::decode::decode;
use crate::rule_cache::RuleCache;
use chrono::{Duration as ChronoDuration, Utc};
use fraud_rules::{group_key, BatchAggregates};
use fraud_stream::{pubsub::InvalidationFlag, KvClient, QueueClient, StreamClient, StreamEntry};
use fraud_types::config::WorkerConfig;
use fraud_types::model::{GroupMode, Rule, RuleKind, Transaction, TransactionStatus};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Runs the main loop until `shutdown` is observed between iterations. A
/// batch already in flight always finishes its insert and ack before the
/// loop checks `shutdown` again (§5 "finish in-flight batch before exit").
pub async fn run(
    db: PgPool,
    redis: redis::aio::ConnectionManager,
    config: WorkerConfig,
    rules_flag: InvalidationFlag,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let mut stream = StreamClient::new(redis.clone());
    let mut kv = KvClient::new(redis.clone());
    let mut queues = QueueClient::new(redis);
    let mut rule_cache = RuleCache::new(config.rules_ttl_secs, rules_flag);

    stream.ensure_group(&config.tx_stream, &config.tx_group).await?;

    let mut last_reclaim = Instant::now();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!(target: "fraud_worker", "shutdown requested, exiting main loop");
            return Ok(());
        }

        let started = Instant::now();

        // Step 1: periodic reclaim of entries idle past `min_idle_ms`.
        let mut entries: Vec<StreamEntry> = Vec::new();
        if last_reclaim.elapsed().as_secs() >= config.claim_interval_secs {
            match stream
                .reclaim(&config.tx_stream, &config.tx_group, &config.tx_consumer, config.min_idle_ms, 500)
                .await
            {
                Ok(reclaimed) => {
                    if !reclaimed.is_empty() {
                        fraud_telemetry::worker_metrics().inc_reclaimed_entries(reclaimed.len() as u64);
                    }
                    entries.extend(reclaimed);
                }
                Err(e) => tracing::warn!(target: "fraud_worker", error = %e, "reclaim failed"),
            }
            last_reclaim = Instant::now();
        }

        // Step 2: block-read new entries.
        match stream
            .read_batch(&config.tx_stream, &config.tx_group, &config.tx_consumer, config.read_count, config.block_ms)
            .await
        {
            Ok(fresh) => entries.extend(fresh),
            Err(e) => {
                tracing::warn!(target: "fraud_worker", error = %e, "read_batch failed");
                continue;
            }
        }

        if entries.is_empty() {
            continue;
        }

        // Step 3: batch cutoff, captured once so every rule change mid-batch
        // is either fully visible or fully deferred.
        let batch_cutoff = Utc::now();

        let mut ack_ids: Vec<String> = Vec::with_capacity(entries.len());
        let mut transactions: Vec<Transaction> = Vec::with_capacity(entries.len());
        for entry in &entries {
            ack_ids.push(entry.id.clone());
            match decode(&entry.fields) {
                Ok(tx) => transactions.push(tx),
                Err(e) => tracing::warn!(target: "fraud_worker", entry_id = %entry.id, error = %e, "dropping malformed stream entry"),
            }
        }

        // Step 4: rule snapshot as of the batch cutoff.
        let rules = match rule_cache.snapshot_as_of(&db, batch_cutoff).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(target: "fraud_worker", error = %e, "rule snapshot load failed, skipping batch");
                ack_best_effort(&mut stream, &config, &ack_ids).await;
                continue;
            }
        };

        // Step 5: pattern pre-aggregation over the superset of groups the
        // active pattern rules need.
        let aggregates = match fetch_aggregates(&db, &rules, &transactions, batch_cutoff).await {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(target: "fraud_worker", error = %e, "pattern aggregate fetch failed, evaluating without it");
                BatchAggregates::new()
            }
        };

        // Step 6: per-transaction rule evaluation.
        let mut ml_pending_entries: Vec<HashMap<String, String>> = Vec::new();
        let mut fresh: Vec<Transaction> = Vec::new();
        let mut recalc_alert_ids: Vec<String> = Vec::new();
        let mut alerted_ids: Vec<String> = Vec::new();
        let mut alerts: Vec<(Transaction, fraud_rules::EvaluationOutcome)> = Vec::new();

        for mut tx in transactions {
            let ml_probability = match kv.ml_probability(&tx.transaction_id).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(target: "fraud_worker", error = %e, transaction_id = %tx.transaction_id, "ml_probability lookup failed");
                    None
                }
            };

            let outcome = fraud_rules::apply_rules(
                &tx,
                &rules,
                &aggregates,
                ml_probability,
                config.stop_mode,
                config.stop_criticality,
            );
            for t in &outcome.triggered {
                fraud_telemetry::worker_metrics().inc_rules_fired(t.kind);
            }
            for (rule_id, rendered) in &outcome.ml_pending {
                let mut fields = HashMap::new();
                fields.insert("transaction_id".to_string(), tx.transaction_id.clone());
                fields.insert("rule_id".to_string(), rule_id.to_string());
                fields.insert("input".to_string(), rendered.clone());
                ml_pending_entries.push(fields);
            }

            let triggered = !outcome.triggered.is_empty();
            if triggered {
                alerted_ids.push(tx.transaction_id.clone());
            }

            // §4.3.5: a recalc entry whose id already exists is never
            // re-inserted, only (re-)promoted; a fresh entry is inserted
            // with `status=alerted` set up front when it already triggered.
            if tx.recalc {
                if triggered {
                    recalc_alert_ids.push(tx.transaction_id.clone());
                }
            } else {
                if triggered {
                    tx.status = TransactionStatus::Alerted;
                }
                fresh.push(tx.clone());
            }

            if triggered {
                alerts.push((tx, outcome));
            }
        }

        if !ml_pending_entries.is_empty() {
            if let Err(e) = stream
                .xadd_chunked(&config.ml_eval_queue, &ml_pending_entries, config.bulk_chunk, 500_000, true)
                .await
            {
                tracing::warn!(target: "fraud_worker", error = %e, "ml_eval_queue enqueue failed");
            }
        }

        // Step 7: bulk persist fresh rows.
        let insert_outcome = fraud_store::transactions::bulk_insert_chunks(&db, &fresh, config.bulk_chunk).await;
        fraud_telemetry::store_metrics().inc_rows_inserted(insert_outcome.inserted as u64);

        // Step 8: promote recalc'd rows that retriggered.
        if let Err(e) = fraud_store::transactions::promote_to_alerted(&db, &recalc_alert_ids).await {
            tracing::warn!(target: "fraud_worker", error = %e, "status promotion failed");
        }

        // Step 9: pipelined ack, best-effort regardless of insert outcome.
        ack_best_effort(&mut stream, &config, &ack_ids).await;

        // Step 10: alert enqueue.
        for (tx, outcome) in &alerts {
            match alert::enqueue(&mut kv, &mut queues, tx, outcome, &config.frontend_base_url, config.webhook_dedup_ttl).await {
                Ok(true) => fraud_telemetry::dispatch_metrics().inc_alerts_sent(),
                Ok(false) => {}
                Err(e) => {
                    fraud_telemetry::dispatch_metrics().inc_alerts_failed();
                    tracing::warn!(target: "fraud_worker", error = %e, transaction_id = %tx.transaction_id, "alert enqueue failed");
                }
            }
        }

        fraud_telemetry::worker_metrics().inc_batches_processed();
        fraud_telemetry::worker_metrics().inc_transactions_alerted(alerted_ids.len() as u64);
        fraud_telemetry::worker_metrics().observe_batch_duration(started.elapsed().as_secs_f64());
    }
}

async fn ack_best_effort(stream: &mut StreamClient, config: &WorkerConfig, ids: &[String]) {
    if let Err(e) = stream.ack(&config.tx_stream, &config.tx_group, ids).await {
        tracing::warn!(target: "fraud_worker", error = %e, count = ids.len(), "ack failed");
    }
}

/// Builds the superset of groups this batch's active pattern rules need and
/// fetches their pre-aggregated stats in at most three queries (§4.3.3).
async fn fetch_aggregates(
    db: &PgPool,
    rules: &[Rule],
    transactions: &[Transaction],
    batch_cutoff: chrono::DateTime<Utc>,
) -> Result<BatchAggregates, fraud_types::error::TransientInfrastructureError> {
    let mut modes = HashSet::new();
    let mut max_window = 0i64;
    for rule in rules {
        if let RuleKind::Pattern(p) = &rule.kind {
            modes.insert(p.group_mode);
            max_window = max_window.max(p.window_seconds);
        }
    }
    if modes.is_empty() {
        return Ok(BatchAggregates::new());
    }

    let mut senders = HashSet::new();
    let mut receivers = HashSet::new();
    let mut pairs = HashSet::new();
    for tx in transactions {
        if modes.contains(&GroupMode::Sender) {
            senders.insert(group_key(GroupMode::Sender, tx));
        }
        if modes.contains(&GroupMode::Receiver) {
            receivers.insert(group_key(GroupMode::Receiver, tx));
        }
        if modes.contains(&GroupMode::Pair) {
            pairs.insert(group_key(GroupMode::Pair, tx));
        }
    }

    let needed = fraud_store::transactions::NeededGroups {
        senders: senders.into_iter().collect(),
        receivers: receivers.into_iter().collect(),
        pairs: pairs.into_iter().collect(),
    };
    let window_start = batch_cutoff - ChronoDuration::seconds(max_window.max(1));
    let mut aggregates = fraud_store::transactions::fetch_pattern_aggregates(db, &needed, window_start).await?;
    aggregates.set_max_window_seconds(max_window);
    Ok(aggregates)
}
