// Path: crates/fraud-telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, HistogramVec, IntCounter, IntCounterVec,
};

// --- Metric Statics ---
// We use OnceCell to hold the metric collectors. They will be initialized
// exactly once by the `install` function.

static INGEST_BATCHES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static INGEST_ITEMS_RECEIVED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static INGEST_ITEMS_QUEUED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static INGEST_ITEMS_INVALID_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static INGEST_ITEMS_DEDUP_DROPPED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static INGEST_IDEMPOTENCY_HITS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static INGEST_BATCH_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

static WORKER_BATCHES_PROCESSED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static WORKER_BATCH_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static WORKER_RULES_FIRED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static WORKER_TRANSACTIONS_ALERTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static WORKER_RULES_CACHE_SIZE: OnceCell<Gauge> = OnceCell::new();
static WORKER_RECLAIMED_ENTRIES_TOTAL: OnceCell<IntCounter> = OnceCell::new();

static STORE_ROWS_INSERTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORE_ROWS_CONFLICT_SKIPPED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORE_QUERY_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

static DISPATCH_ALERTS_SENT_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static DISPATCH_ALERTS_FAILED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static DISPATCH_ALERTS_DEDUPED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static DISPATCH_WEBHOOK_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

impl IngestMetricsSink for PrometheusSink {
    fn inc_batches_received(&self) {
        get_metric!(INGEST_BATCHES_TOTAL).inc();
    }
    fn inc_items_received(&self, count: u64) {
        get_metric!(INGEST_ITEMS_RECEIVED_TOTAL).inc_by(count);
    }
    fn inc_items_queued(&self, count: u64) {
        get_metric!(INGEST_ITEMS_QUEUED_TOTAL).inc_by(count);
    }
    fn inc_items_invalid(&self, count: u64) {
        get_metric!(INGEST_ITEMS_INVALID_TOTAL).inc_by(count);
    }
    fn inc_items_dedup_dropped(&self, count: u64) {
        get_metric!(INGEST_ITEMS_DEDUP_DROPPED_TOTAL).inc_by(count);
    }
    fn inc_idempotency_hits(&self) {
        get_metric!(INGEST_IDEMPOTENCY_HITS_TOTAL).inc();
    }
    fn observe_batch_duration(&self, duration_secs: f64) {
        get_metric!(INGEST_BATCH_DURATION_SECONDS)
            .with_label_values(&["ingest"])
            .observe(duration_secs);
    }
}

impl WorkerMetricsSink for PrometheusSink {
    fn inc_batches_processed(&self) {
        get_metric!(WORKER_BATCHES_PROCESSED_TOTAL).inc();
    }
    fn observe_batch_duration(&self, duration_secs: f64) {
        get_metric!(WORKER_BATCH_DURATION_SECONDS)
            .with_label_values(&["worker"])
            .observe(duration_secs);
    }
    fn inc_rules_fired(&self, kind: &str) {
        get_metric!(WORKER_RULES_FIRED_TOTAL)
            .with_label_values(&[kind])
            .inc();
    }
    fn inc_transactions_alerted(&self, count: u64) {
        get_metric!(WORKER_TRANSACTIONS_ALERTED_TOTAL).inc_by(count);
    }
    fn set_rules_cache_size(&self, size: f64) {
        get_metric!(WORKER_RULES_CACHE_SIZE).set(size);
    }
    fn inc_reclaimed_entries(&self, count: u64) {
        get_metric!(WORKER_RECLAIMED_ENTRIES_TOTAL).inc_by(count);
    }
}

impl StoreMetricsSink for PrometheusSink {
    fn inc_rows_inserted(&self, count: u64) {
        get_metric!(STORE_ROWS_INSERTED_TOTAL).inc_by(count);
    }
    fn inc_rows_conflict_skipped(&self, count: u64) {
        get_metric!(STORE_ROWS_CONFLICT_SKIPPED_TOTAL).inc_by(count);
    }
    fn observe_query_duration(&self, op: &str, duration_secs: f64) {
        get_metric!(STORE_QUERY_DURATION_SECONDS)
            .with_label_values(&[op])
            .observe(duration_secs);
    }
}

impl DispatchMetricsSink for PrometheusSink {
    fn inc_alerts_sent(&self) {
        get_metric!(DISPATCH_ALERTS_SENT_TOTAL).inc();
    }
    fn inc_alerts_failed(&self) {
        get_metric!(DISPATCH_ALERTS_FAILED_TOTAL).inc();
    }
    fn inc_alerts_deduped(&self) {
        get_metric!(DISPATCH_ALERTS_DEDUPED_TOTAL).inc();
    }
    fn observe_webhook_duration(&self, duration_secs: f64) {
        get_metric!(DISPATCH_WEBHOOK_DURATION_SECONDS)
            .with_label_values(&["alerts"])
            .observe(duration_secs);
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, variant])
            .inc();
    }
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    INGEST_BATCHES_TOTAL
        .set(register_int_counter!(
            "fraud_ingest_batches_total",
            "Total ingestion batches accepted."
        )?)
        .expect("static already initialized");
    INGEST_ITEMS_RECEIVED_TOTAL
        .set(register_int_counter!(
            "fraud_ingest_items_received_total",
            "Total transactions received across all batches."
        )?)
        .expect("static already initialized");
    INGEST_ITEMS_QUEUED_TOTAL
        .set(register_int_counter!(
            "fraud_ingest_items_queued_total",
            "Total transactions appended to the transactions stream."
        )?)
        .expect("static already initialized");
    INGEST_ITEMS_INVALID_TOTAL
        .set(register_int_counter!(
            "fraud_ingest_items_invalid_total",
            "Total items dropped by per-item validation."
        )?)
        .expect("static already initialized");
    INGEST_ITEMS_DEDUP_DROPPED_TOTAL
        .set(register_int_counter!(
            "fraud_ingest_items_dedup_dropped_total",
            "Total items dropped by the dedup filter."
        )?)
        .expect("static already initialized");
    INGEST_IDEMPOTENCY_HITS_TOTAL
        .set(register_int_counter!(
            "fraud_ingest_idempotency_hits_total",
            "Total requests served from the idempotency cache."
        )?)
        .expect("static already initialized");
    INGEST_BATCH_DURATION_SECONDS
        .set(register_histogram_vec!(
            "fraud_ingest_batch_duration_seconds",
            "Duration of handling one ingestion request.",
            &["stage"],
            exponential_buckets(0.001, 2.0, 16)?
        )?)
        .expect("static already initialized");
    WORKER_BATCHES_PROCESSED_TOTAL
        .set(register_int_counter!(
            "fraud_worker_batches_processed_total",
            "Total stream batches fully processed by the evaluation worker."
        )?)
        .expect("static already initialized");
    WORKER_BATCH_DURATION_SECONDS
        .set(register_histogram_vec!(
            "fraud_worker_batch_duration_seconds",
            "Duration of one evaluation-worker main-loop iteration.",
            &["stage"],
            exponential_buckets(0.001, 2.0, 16)?
        )?)
        .expect("static already initialized");
    WORKER_RULES_FIRED_TOTAL
        .set(register_int_counter_vec!(
            "fraud_worker_rules_fired_total",
            "Total rule fires, labeled by rule kind.",
            &["kind"]
        )?)
        .expect("static already initialized");
    WORKER_TRANSACTIONS_ALERTED_TOTAL
        .set(register_int_counter!(
            "fraud_worker_transactions_alerted_total",
            "Total transactions promoted to alerted status."
        )?)
        .expect("static already initialized");
    WORKER_RULES_CACHE_SIZE
        .set(register_gauge!(
            "fraud_worker_rules_cache_size",
            "Current number of active rules in the in-process cache."
        )?)
        .expect("static already initialized");
    WORKER_RECLAIMED_ENTRIES_TOTAL
        .set(register_int_counter!(
            "fraud_worker_reclaimed_entries_total",
            "Total pending stream entries reclaimed from dead consumers."
        )?)
        .expect("static already initialized");
    STORE_ROWS_INSERTED_TOTAL
        .set(register_int_counter!(
            "fraud_store_rows_inserted_total",
            "Total transaction rows newly inserted."
        )?)
        .expect("static already initialized");
    STORE_ROWS_CONFLICT_SKIPPED_TOTAL
        .set(register_int_counter!(
            "fraud_store_rows_conflict_skipped_total",
            "Total rows skipped on conflict (already present)."
        )?)
        .expect("static already initialized");
    STORE_QUERY_DURATION_SECONDS
        .set(register_histogram_vec!(
            "fraud_store_query_duration_seconds",
            "Duration of a named database operation.",
            &["op"],
            exponential_buckets(0.0005, 2.0, 16)?
        )?)
        .expect("static already initialized");
    DISPATCH_ALERTS_SENT_TOTAL
        .set(register_int_counter!(
            "fraud_dispatch_alerts_sent_total",
            "Total alerts successfully delivered to the webhook sink."
        )?)
        .expect("static already initialized");
    DISPATCH_ALERTS_FAILED_TOTAL
        .set(register_int_counter!(
            "fraud_dispatch_alerts_failed_total",
            "Total alerts that failed delivery."
        )?)
        .expect("static already initialized");
    DISPATCH_ALERTS_DEDUPED_TOTAL
        .set(register_int_counter!(
            "fraud_dispatch_alerts_deduped_total",
            "Total alerts skipped because an identical alert was already sent."
        )?)
        .expect("static already initialized");
    DISPATCH_WEBHOOK_DURATION_SECONDS
        .set(register_histogram_vec!(
            "fraud_dispatch_webhook_duration_seconds",
            "Duration of one outbound webhook POST.",
            &["sink"],
            exponential_buckets(0.001, 2.0, 16)?
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "fraud_errors_total",
            "Total number of errors, categorized by type and variant.",
            &["kind", "variant"]
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
