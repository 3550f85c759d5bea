//! Path: crates/fraud-dispatcher/src/main.rs
#![forbid(unsafe_code)]
use clap::Parser;
use fraud_dispatcher::dispatch::run_worker;
use fraud_types::config::{CommonOpts, DispatcherConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;

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
    tracing::info!(target: "fraud_dispatcher", "shutdown signal received");
    shutdown.store(true, Ordering::SeqCst);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = CommonOpts::parse();
    fraud_telemetry::init::init_tracing()?;
    fraud_telemetry::prometheus::install()?;

    let config = Arc::new(DispatcherConfig::from_env());
    let telemetry_addr: std::net::SocketAddr = opts.telemetry_addr.parse()?;
    let client = reqwest::Client::builder().build()?;
    let inflight = Arc::new(Semaphore::new(config.webhook_workers * 4));
    let shutdown = Arc::new(AtomicBool::new(false));

    tracing::info!(
        target: "fraud_dispatcher",
        workers = config.webhook_workers,
        webhook_base_url = %config.webhook_base_url,
        "starting alert dispatcher"
    );

    tokio::spawn(watch_for_shutdown(shutdown.clone()));

    let mut workers = Vec::with_capacity(config.webhook_workers);
    for worker_id in 0..config.webhook_workers {
        let redis = fraud_stream::connect(&config.redis.connection_string()).await?;
        workers.push(tokio::spawn(run_worker(
            worker_id,
            redis,
            config.clone(),
            client.clone(),
            inflight.clone(),
            shutdown.clone(),
        )));
    }

    tokio::select! {
        _ = futures_util::future::join_all(workers) => {}
        _ = fraud_telemetry::http::run_server(telemetry_addr) => {}
    }

    Ok(())
}
