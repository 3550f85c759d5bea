//! Path: crates/fraud-stream/src/queues.rs
//! The "alerts" fan-out list and the "telegram" fan-out stream consumed by
//! the (out-of-core-scope) dispatcher and Telegram worker (§4.4).
use crate::infra_err;
use fraud_types::error::TransientInfrastructureError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const ALERTS_QUEUE: &str = "alerts_queue";
const TG_ALERT_QUEUE: &str = "tg_alert_queue";
const TG_ALERT_QUEUE_MAXLEN: u64 = 2_000;

pub struct QueueClient {
    conn: ConnectionManager,
}

impl QueueClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Pushes an alert payload onto `alerts_queue` for the dispatcher pool
    /// to drain (§4.4).
    pub async fn push_alert(
        &mut self,
        payload: &serde_json::Value,
    ) -> Result<(), TransientInfrastructureError> {
        let body = serde_json::to_string(payload).unwrap_or_default();
        let _: () = self
            .conn
            .lpush(ALERTS_QUEUE, body)
            .await
            .map_err(|e| infra_err("push_alert", e))?;
        Ok(())
    }

    /// Blocking-pops one alert payload with a timeout, as the dispatcher
    /// workers do (§4.4 "Each worker blocking-pops from alerts_queue (5s
    /// timeout)").
    pub async fn pop_alert(
        &mut self,
        timeout_secs: f64,
    ) -> Result<Option<serde_json::Value>, TransientInfrastructureError> {
        let reply: Option<(String, String)> = self
            .conn
            .brpop(ALERTS_QUEUE, timeout_secs)
            .await
            .map_err(|e| infra_err("pop_alert", e))?;
        Ok(reply.and_then(|(_, body)| serde_json::from_str(&body).ok()))
    }

    /// Appends a Telegram fan-out entry onto a stream capped at 2,000
    /// entries (§4.4 "Telegram fan-out (secondary)"). Failure is logged by
    /// the caller and treated as non-fatal, per spec.
    pub async fn push_telegram_alert(
        &mut self,
        fields: &[(&str, &str)],
    ) -> Result<(), TransientInfrastructureError> {
        let _: String = self
            .conn
            .xadd_maxlen(
                TG_ALERT_QUEUE,
                redis::streams::StreamMaxlen::Approx(TG_ALERT_QUEUE_MAXLEN as usize),
                "*",
                fields,
            )
            .await
            .map_err(|e| infra_err("push_telegram_alert", e))?;
        Ok(())
    }
}
