//! Path: crates/fraud-worker/src/main.rs
#![forbid(unsafe_code)]
use clap::Parser;
use fraud_types::config::{CommonOpts, WorkerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;

async fn watch_for_shutdown(shutdown: Arc<AtomicBool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!(target: "fraud_worker", "shutdown signal received");
    shutdown.store(true, Ordering::SeqCst);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = CommonOpts::parse();
    fraud_telemetry::init::init_tracing()?;
    fraud_telemetry::prometheus::install()?;

    let config = WorkerConfig::from_env();
    let redis = fraud_stream::connect(&config.redis.connection_string()).await?;
    let db = fraud_store::connect(&config.db.connection_string()).await?;

    let telemetry_addr: std::net::SocketAddr = opts.telemetry_addr.parse()?;

    tracing::info!(
        target: "fraud_worker",
        tx_stream = %config.tx_stream,
        tx_group = %config.tx_group,
        tx_consumer = %config.tx_consumer,
        "starting evaluation worker"
    );

    let rules_flag = fraud_stream::pubsub::new_invalidation_flag();
    let listener = tokio::spawn(fraud_stream::pubsub::run_listener(config.redis.connection_string(), rules_flag.clone()));

    let shutdown = Arc::new(AtomicBool::new(false));
    tokio::spawn(watch_for_shutdown(shutdown.clone()));

    tokio::select! {
        result = fraud_worker::run::run(db, redis, config, rules_flag, shutdown) => {
            if let Err(e) = result {
                tracing::error!(target: "fraud_worker", error = ?e, "main loop exited with error");
            }
        }
        _ = fraud_telemetry::http::run_server(telemetry_addr) => {}
    }

    listener.abort();
    Ok(())
}
