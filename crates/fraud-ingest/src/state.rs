//! Path: crates/fraud-ingest/src/state.rs
use fraud_types::config::IngestConfig;
use redis::aio::ConnectionManager;
use sqlx::PgPool;

/// Shared application state. `ConnectionManager` and `PgPool` are both
/// cheap to clone (they wrap an `Arc` internally), so every handler clones
/// its own `StreamClient`/`KvClient` from `redis` rather than locking a
/// shared connection.
#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub db: PgPool,
    pub config: IngestConfig,
}
