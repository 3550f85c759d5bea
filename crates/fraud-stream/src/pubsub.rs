//! Path: crates/fraud-stream/src/pubsub.rs
//! The "rules-reload" pub/sub channel (§4.5): every rule-store write
//! publishes on it; the evaluation worker's background listener sets an
//! invalidation flag that the main loop consults before its next batch.
use fraud_types::error::TransientInfrastructureError;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CHANNEL: &str = "rules_reload";

/// Publishes a rule-change notification. Called by the rule-CRUD HTTP
/// handlers on every create/update/delete.
pub async fn publish_rules_reload(
    conn: &mut ConnectionManager,
) -> Result<(), TransientInfrastructureError> {
    let _: i64 = conn
        .publish(CHANNEL, "1")
        .await
        .map_err(|e| crate::infra_err("publish_rules_reload", e))?;
    Ok(())
}

/// A shared flag the rule cache consults each main-loop iteration. The
/// background listener task sets it on every message; the cache clears it
/// after a successful reload (§4.3.1).
pub type InvalidationFlag = Arc<AtomicBool>;

pub fn new_invalidation_flag() -> InvalidationFlag {
    Arc::new(AtomicBool::new(false))
}

/// Runs forever, blocking on the pub/sub stream (§5 "Rules listener thread:
/// blocks on pub/sub stream indefinitely"), setting `flag` on every message.
/// Intended to run as a dedicated background task; reconnects on stream end
/// rather than returning, since a dropped subscription must not silently
/// stop rule invalidation.
pub async fn run_listener(redis_url: String, flag: InvalidationFlag) {
    loop {
        match redis::Client::open(redis_url.as_str()) {
            Ok(client) => match client.get_async_connection().await {
                Ok(conn) => {
                    let mut pubsub = conn.into_pubsub();
                    if pubsub.subscribe(CHANNEL).await.is_err() {
                        tracing::warn!(target = "fraud_stream::pubsub", "failed to subscribe to rules_reload, retrying");
                    } else {
                        let mut stream = pubsub.on_message();
                        while stream.next().await.is_some() {
                            flag.store(true, Ordering::SeqCst);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(target = "fraud_stream::pubsub", error = %e, "pubsub connection failed, retrying");
                }
            },
            Err(e) => {
                tracing::warn!(target = "fraud_stream::pubsub", error = %e, "pubsub client open failed, retrying");
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}
