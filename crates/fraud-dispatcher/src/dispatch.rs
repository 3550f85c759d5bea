//! Path: crates/fraud-dispatcher/src/dispatch.rs
//! One worker's loop: blocking-pop `alerts_queue` (5s timeout), POST to the
//! webhook with a 5s deadline, log the outcome, never retry (§4.4).
use fraud_stream::QueueClient;
use fraud_types::config::DispatcherConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

const POP_TIMEOUT_SECS: f64 = 5.0;
const POST_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs one worker's pop loop until `shutdown` is observed. Each popped
/// alert is dispatched as its own task gated by `inflight`, so a slow
/// webhook never blocks this worker's next pop — `inflight`'s permit count
/// (`workers * 4`) is what actually bounds concurrent outbound requests.
pub async fn run_worker(
    worker_id: usize,
    redis: redis::aio::ConnectionManager,
    config: Arc<DispatcherConfig>,
    client: reqwest::Client,
    inflight: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
) {
    let mut queues = QueueClient::new(redis);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!(target: "fraud_dispatcher", worker_id, "worker exiting");
            return;
        }

        let alert = match queues.pop_alert(POP_TIMEOUT_SECS).await {
            Ok(Some(alert)) => alert,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(target: "fraud_dispatcher", worker_id, error = %e, "pop_alert failed");
                continue;
            }
        };

        let Ok(permit) = inflight.clone().acquire_owned().await else {
            continue;
        };
        let client = client.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let _permit = permit;
            deliver(&client, &config, alert).await;
        });
    }
}

async fn deliver(client: &reqwest::Client, config: &DispatcherConfig, alert: serde_json::Value) {
    let criticality = alert.get("criticality").and_then(|v| v.as_str()).unwrap_or("unset");
    let url = format!("{}/api/alerts/{}", config.webhook_base_url, criticality);
    let started = Instant::now();

    let result = client.post(&url).json(&alert).timeout(POST_TIMEOUT).send().await;
    let duration = started.elapsed().as_secs_f64();
    fraud_telemetry::dispatch_metrics().observe_webhook_duration(duration);

    match result {
        Ok(response) if response.status().is_success() => {
            fraud_telemetry::dispatch_metrics().inc_alerts_sent();
            tracing::info!(target: "fraud_dispatcher", url, status = response.status().as_u16(), "alert delivered");
        }
        Ok(response) => {
            fraud_telemetry::dispatch_metrics().inc_alerts_failed();
            tracing::warn!(target: "fraud_dispatcher", url, status = response.status().as_u16(), "webhook returned non-success");
        }
        Err(e) => {
            fraud_telemetry::dispatch_metrics().inc_alerts_failed();
            tracing::warn!(target: "fraud_dispatcher", url, error = %e, "webhook POST failed");
        }
    }
}
