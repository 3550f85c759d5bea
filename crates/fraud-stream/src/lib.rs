//! Path: crates/fraud-stream/src/lib.rs
//! Redis-backed durable stream, fan-out queues, pub/sub, and ephemeral
//! key-value store (§3 Idempotency record / Dedup token set / Batch
//! fingerprint, §4.2 Stream & Consumer Protocol, §4.4 Alert Dispatcher).

/// The transactions stream: append, consumer-group read, ack, reclaim.
pub mod stream;
/// Idempotency cache, dedup token set, batch fingerprint set, ML probability cache.
pub mod kv;
/// The "alerts" and "telegram" fan-out queues.
pub mod queues;
/// The "rules-reload" pub/sub channel.
pub mod pubsub;

pub use kv::KvClient;
pub use queues::QueueClient;
pub use stream::{StreamClient, StreamEntry};

use fraud_types::error::{FatalInitError, TransientInfrastructureError};

/// Opens a Redis connection manager, failing fast (§7 FatalInitError) if the
/// initial connection cannot be established.
pub async fn connect(url: &str) -> Result<redis::aio::ConnectionManager, FatalInitError> {
    let client = redis::Client::open(url).map_err(|e| FatalInitError::Redis(e.to_string()))?;
    client
        .get_connection_manager()
        .await
        .map_err(|e| FatalInitError::Redis(e.to_string()))
}

pub(crate) fn infra_err(context: &str, e: redis::RedisError) -> TransientInfrastructureError {
    TransientInfrastructureError::Stream(format!("{context}: {e}"))
}
