// Path: crates/fraud-telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured ingestion metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn ingest_metrics() -> &'static dyn IngestMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured evaluation-worker metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn worker_metrics() -> &'static dyn WorkerMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured store metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn store_metrics() -> &'static dyn StoreMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured dispatcher metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn dispatch_metrics() -> &'static dyn DispatchMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the ingestion HTTP service (§4.1).
pub trait IngestMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of batches accepted at the ingestion endpoint.
    fn inc_batches_received(&self);
    /// Increments the counter of individual transactions received, across all batches.
    fn inc_items_received(&self, count: u64);
    /// Increments the counter of items appended to the transactions stream.
    fn inc_items_queued(&self, count: u64);
    /// Increments the counter of items dropped by per-item validation.
    fn inc_items_invalid(&self, count: u64);
    /// Increments the counter of items dropped by the dedup filter.
    fn inc_items_dedup_dropped(&self, count: u64);
    /// Increments the counter of requests served from the idempotency cache.
    fn inc_idempotency_hits(&self);
    /// Observes the end-to-end duration of handling one ingestion request.
    fn observe_batch_duration(&self, duration_secs: f64);
}
impl IngestMetricsSink for NopSink {
    fn inc_batches_received(&self) {}
    fn inc_items_received(&self, _count: u64) {}
    fn inc_items_queued(&self, _count: u64) {}
    fn inc_items_invalid(&self, _count: u64) {}
    fn inc_items_dedup_dropped(&self, _count: u64) {}
    fn inc_idempotency_hits(&self) {}
    fn observe_batch_duration(&self, _duration_secs: f64) {}
}

/// A sink for metrics related to the evaluation worker main loop (§4.3).
pub trait WorkerMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of stream batches fully processed.
    fn inc_batches_processed(&self);
    /// Observes the duration of one full main-loop iteration.
    fn observe_batch_duration(&self, duration_secs: f64);
    /// Increments a counter of fired rules, labeled by rule kind.
    fn inc_rules_fired(&self, kind: &str);
    /// Increments the counter of transactions promoted to `alerted` status.
    fn inc_transactions_alerted(&self, count: u64);
    /// Sets the gauge for the current size of the in-process rule cache.
    fn set_rules_cache_size(&self, size: f64);
    /// Increments the counter of pending stream entries reclaimed from dead consumers.
    fn inc_reclaimed_entries(&self, count: u64);
}
impl WorkerMetricsSink for NopSink {
    fn inc_batches_processed(&self) {}
    fn observe_batch_duration(&self, _duration_secs: f64) {}
    fn inc_rules_fired(&self, _kind: &str) {}
    fn inc_transactions_alerted(&self, _count: u64) {}
    fn set_rules_cache_size(&self, _size: f64) {}
    fn inc_reclaimed_entries(&self, _count: u64) {}
}

/// A sink for metrics related to the Rule Store and Transaction Store.
pub trait StoreMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of transaction rows newly inserted.
    fn inc_rows_inserted(&self, count: u64);
    /// Increments the counter of rows skipped on conflict (already present).
    fn inc_rows_conflict_skipped(&self, count: u64);
    /// Observes the duration of a named database operation.
    fn observe_query_duration(&self, op: &str, duration_secs: f64);
}
impl StoreMetricsSink for NopSink {
    fn inc_rows_inserted(&self, _count: u64) {}
    fn inc_rows_conflict_skipped(&self, _count: u64) {}
    fn observe_query_duration(&self, _op: &str, _duration_secs: f64) {}
}

/// A sink for metrics related to the alert dispatcher (§4.4).
pub trait DispatchMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter of alerts successfully delivered.
    fn inc_alerts_sent(&self);
    /// Increments the counter of alerts that failed delivery (non-200 or error).
    fn inc_alerts_failed(&self);
    /// Increments the counter of alerts skipped because of dedup.
    fn inc_alerts_deduped(&self);
    /// Observes the duration of one outbound webhook POST.
    fn observe_webhook_duration(&self, duration_secs: f64);
}
impl DispatchMetricsSink for NopSink {
    fn inc_alerts_sent(&self) {}
    fn inc_alerts_failed(&self) {}
    fn inc_alerts_deduped(&self) {}
    fn observe_webhook_duration(&self, _duration_secs: f64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    IngestMetricsSink
    + WorkerMetricsSink
    + StoreMetricsSink
    + DispatchMetricsSink
    + ErrorMetricsSink
{
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where
    T: IngestMetricsSink
        + WorkerMetricsSink
        + StoreMetricsSink
        + DispatchMetricsSink
        + ErrorMetricsSink
{
}
