//! Path: crates/fraud-types/src/config.rs
//! Environment-variable configuration, one typed struct per binary, per
//! SPEC_FULL.md §6 / §10. Every variable is optional with the documented
//! default; nothing panics on a missing variable.
use clap::Parser;
use std::str::FromStr;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool_or(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Redis connection settings, shared by every binary.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("REDIS_HOST", "redis"),
            port: env_parse_or("REDIS_PORT", 6379),
        }
    }

    pub fn connection_string(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// Postgres connection settings, shared by every binary.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            name: env_or("DB_NAME", "fraud"),
            user: env_or("DB_USER", "fraud"),
            password: env_or("DB_PASSWORD", ""),
            host: env_or("DB_HOST", "localhost"),
            port: env_parse_or("DB_PORT", 5432),
        }
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Process-level flags not carried in the environment table (log-level
/// override only — everything else is env-var-native per §6).
#[derive(Debug, Parser)]
pub struct CommonOpts {
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,
    #[arg(long, default_value = "0.0.0.0:9616")]
    pub telemetry_addr: String,
}

/// Ingestion service configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub redis: RedisConfigRef,
    pub db: DbConfigRef,
    pub tx_stream: String,
    pub max_batch: usize,
    pub val_chunk: usize,
    pub xadd_chunk: usize,
    pub stream_maxlen: u64,
    pub trim_approx: bool,
    pub idemp_ttl: u64,
    pub idemp_ns: String,
    pub fpg_ns: String,
    pub fpg_ttl: u64,
    pub use_dedup: bool,
    pub dedup_keys: Vec<String>,
    pub dedup_ttl: u64,
    pub dedup_check_chunk: usize,
    pub lookup_chunk: usize,
    pub bind_addr: String,
}

/// Thin wrapper so `RedisConfig`/`DbConfig` can be reused by value without
/// repeating `from_env()` plumbing in every config struct below.
pub type RedisConfigRef = RedisConfig;
pub type DbConfigRef = DbConfig;

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            db: DbConfig::from_env(),
            tx_stream: env_or("TX_STREAM", "transactions_stream"),
            max_batch: env_parse_or("TX_MAX_BATCH", 90_000),
            val_chunk: env_parse_or("TX_VALIDATE_CHUNK", 1_000),
            xadd_chunk: env_parse_or("TX_XADD_CHUNK", 5_000),
            stream_maxlen: env_parse_or("TX_STREAM_MAXLEN", 2_000_000),
            trim_approx: env_bool_or("TX_TRIM_APPROX", true),
            idemp_ttl: env_parse_or("TX_IDEMP_TTL", 86_400),
            idemp_ns: env_or("TX_IDEMP_NS", "idemp"),
            fpg_ns: env_or("TX_FPG_NS", "fpg"),
            fpg_ttl: env_parse_or("TX_FPG_TTL", 86_400),
            use_dedup: env_bool_or("TX_USE_DEDUP", true),
            dedup_keys: env_or("TX_DEDUP_KEYS", "correlation_id,transaction_id")
                .split(',')
                .map(str::to_string)
                .collect(),
            dedup_ttl: env_parse_or("TX_DEDUP_TTL", 3_600),
            dedup_check_chunk: env_parse_or("TX_DEDUP_CHECK_CHUNK", 1_000),
            lookup_chunk: env_parse_or("TX_LOOKUP_CHUNK", 1_000),
            bind_addr: env_or("INGEST_BIND_ADDR", "0.0.0.0:8080"),
        }
    }
}

/// Evaluation worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis: RedisConfigRef,
    pub db: DbConfigRef,
    pub tx_stream: String,
    pub tx_group: String,
    pub tx_consumer: String,
    pub read_count: usize,
    pub block_ms: u64,
    pub claim_interval_secs: u64,
    pub min_idle_ms: i64,
    pub bulk_chunk: usize,
    pub rules_ttl_secs: u64,
    pub stop_mode: StopMode,
    pub stop_criticality: u8,
    pub webhook_dedup_ttl: u64,
    pub frontend_base_url: String,
    pub ml_eval_queue: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Critical,
    Never,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            db: DbConfig::from_env(),
            tx_stream: env_or("TX_STREAM", "transactions_stream"),
            tx_group: env_or("TX_GROUP", "fraud_detection_group"),
            tx_consumer: env_or("TX_CONSUMER", "worker-1"),
            read_count: env_parse_or("TX_READ_COUNT", 8_000),
            block_ms: env_parse_or("TX_BLOCK_MS", 5_000),
            claim_interval_secs: env_parse_or("TX_CLAIM_INTERVAL", 10),
            min_idle_ms: env_parse_or("TX_MIN_IDLE_MS", 300_000),
            bulk_chunk: env_parse_or("TX_BULK_CHUNK", 5_000),
            rules_ttl_secs: env_parse_or("TX_RULES_TTL_SEC", 30),
            stop_mode: match env_or("TX_STOP_MODE", "critical").as_str() {
                "critical" => StopMode::Critical,
                _ => StopMode::Never,
            },
            stop_criticality: env_parse_or("TX_STOP_CRITICALITY", 4),
            webhook_dedup_ttl: env_parse_or("WEBHOOK_DEDUP_TTL", 600),
            frontend_base_url: env_or("FRONTEND_BASE_URL", "http://localhost:3000"),
            ml_eval_queue: env_or("ML_EVAL_QUEUE", "ml_eval_queue"),
        }
    }
}

/// Alert dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub redis: RedisConfigRef,
    pub webhook_workers: usize,
    pub webhook_dedup_ttl: u64,
    pub webhook_base_url: String,
    pub frontend_base_url: String,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            webhook_workers: env_parse_or("WEBHOOK_WORKERS", 4),
            webhook_dedup_ttl: env_parse_or("WEBHOOK_DEDUP_TTL", 600),
            webhook_base_url: env_or("WEBHOOK_BASE_URL", "http://localhost:8082"),
            frontend_base_url: env_or("FRONTEND_BASE_URL", "http://localhost:3000"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_or_falls_back_on_unset_or_bad_value() {
        std::env::remove_var("FRAUD_TYPES_TEST_UNSET");
        assert_eq!(env_parse_or::<u64>("FRAUD_TYPES_TEST_UNSET", 42), 42);
    }

    #[test]
    fn env_bool_or_accepts_the_documented_truthy_values() {
        std::env::set_var("FRAUD_TYPES_TEST_BOOL", "yes");
        assert!(env_bool_or("FRAUD_TYPES_TEST_BOOL", false));
        std::env::remove_var("FRAUD_TYPES_TEST_BOOL");
    }
}
