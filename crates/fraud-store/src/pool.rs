//! Path: crates/fraud-store/src/pool.rs
use fraud_types::error::FatalInitError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::time::Duration;

/// Opens a connection pool bounded by a 60s max connection age (§5 "The DB
/// uses connection-pooling with 60s max connection age"), failing fast with
/// `FatalInitError` if the database is unreachable at startup.
pub async fn connect(connection_string: &str) -> Result<sqlx::PgPool, FatalInitError> {
    let opts = PgConnectOptions::from_str(connection_string)
        .map_err(|e| FatalInitError::Postgres(e.to_string()))?
        .ssl_mode(PgSslMode::Prefer);

    PgPoolOptions::new()
        .max_connections(20)
        .max_lifetime(Duration::from_secs(60))
        .connect_with(opts)
        .await
        .map_err(|e| FatalInitError::Postgres(e.to_string()))
}
