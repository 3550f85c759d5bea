//! Path: crates/fraud-ingest/src/main.rs
#![forbid(unsafe_code)]
use clap::Parser;
use fraud_ingest::state::AppState;
use fraud_types::config::{CommonOpts, IngestConfig};
use std::net::SocketAddr;
use tokio::signal;

async fn shutdown_signal() {
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = CommonOpts::parse();
    fraud_telemetry::init::init_tracing()?;
    fraud_telemetry::prometheus::install()?;
    tracing::info!(target: "fraud_ingest", "metrics sink installed");

    let config = IngestConfig::from_env();
    let redis = fraud_stream::connect(&config.redis.connection_string()).await?;
    let db = fraud_store::connect(&config.db.connection_string()).await?;

    let bind_addr: SocketAddr = config.bind_addr.parse()?;
    let telemetry_addr: SocketAddr = opts.telemetry_addr.parse()?;

    let state = AppState {
        redis,
        db,
        config: config.clone(),
    };
    let router = fraud_ingest::build_router(state, 32 * 1024 * 1024);

    tracing::info!(target: "fraud_ingest", %bind_addr, %telemetry_addr, "starting ingestion service");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(target: "fraud_ingest", error = %e, "server error");
            }
        }
        _ = fraud_telemetry::http::run_server(telemetry_addr) => {}
    }

    Ok(())
}
