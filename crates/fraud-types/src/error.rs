//! Path: crates/fraud-types/src/error.rs
//! Error taxonomy per SPEC_FULL.md §7.
use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error,
/// used for log correlation and error-metric labeling.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Per-item validation failure during ingestion. Accumulated and previewed
/// in the ingestion response; never aborts the batch.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {field} has invalid shape: {reason}")]
    InvalidShape { field: &'static str, reason: String },
    #[error("amount must be positive and at most 12 digits / 2 fractional")]
    InvalidAmount,
    #[error("timestamp is in the future")]
    FutureTimestamp,
    #[error("malformed ip address: {0}")]
    MalformedIp(String),
    #[error("account identifier does not match ACC\\d+: {0}")]
    InvalidAccount(String),
}

impl ErrorCode for ValidationError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "VALIDATION_MISSING_FIELD",
            Self::InvalidShape { .. } => "VALIDATION_INVALID_SHAPE",
            Self::InvalidAmount => "VALIDATION_INVALID_AMOUNT",
            Self::FutureTimestamp => "VALIDATION_FUTURE_TIMESTAMP",
            Self::MalformedIp(_) => "VALIDATION_MALFORMED_IP",
            Self::InvalidAccount(_) => "VALIDATION_INVALID_ACCOUNT",
        }
    }
}

/// A backend (Redis or Postgres) operational failure. Logged; the current
/// chunk is skipped without acknowledging so reclaim recovers it.
#[derive(Debug, Error)]
pub enum TransientInfrastructureError {
    #[error("stream command failed: {0}")]
    Stream(String),
    #[error("database operation failed: {0}")]
    Database(String),
}

impl ErrorCode for TransientInfrastructureError {
    fn code(&self) -> &'static str {
        match self {
            Self::Stream(_) => "INFRA_STREAM_ERROR",
            Self::Database(_) => "INFRA_DATABASE_ERROR",
        }
    }
}

/// An error raised while evaluating a single rule against a single
/// transaction. The offending rule is skipped; other rules and other
/// transactions continue.
#[derive(Debug, Error)]
pub enum RuleEvaluationError {
    #[error("could not coerce field {field} to a number: {reason}")]
    Coercion { field: String, reason: String },
    #[error("malformed rule structure: {0}")]
    MalformedRule(String),
}

impl ErrorCode for RuleEvaluationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Coercion { .. } => "RULE_COERCION_FAILED",
            Self::MalformedRule(_) => "RULE_MALFORMED",
        }
    }
}

/// Missing stream/group (self-heals by creating) or an unsupported server
/// feature (logs a warning and continues in a degraded mode).
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("consumer group {group} does not exist on stream {stream} and could not be created: {reason}")]
    GroupCreationFailed {
        stream: String,
        group: String,
        reason: String,
    },
    #[error("server does not support {0}; continuing without it")]
    UnsupportedFeature(&'static str),
}

impl ErrorCode for ConfigurationError {
    fn code(&self) -> &'static str {
        match self {
            Self::GroupCreationFailed { .. } => "CONFIG_GROUP_CREATION_FAILED",
            Self::UnsupportedFeature(_) => "CONFIG_UNSUPPORTED_FEATURE",
        }
    }
}

/// Alert POST failure (non-200 or timeout). Logged, not retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("alert webhook returned non-success status {status}")]
    NonSuccessStatus { status: u16 },
    #[error("alert webhook request failed: {0}")]
    Request(String),
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::NonSuccessStatus { .. } => "DISPATCH_NON_SUCCESS_STATUS",
            Self::Request(_) => "DISPATCH_REQUEST_FAILED",
        }
    }
}

/// Cannot connect to the key-value store (or database) on startup.
/// The only taxonomy member that aborts the process.
#[derive(Debug, Error)]
pub enum FatalInitError {
    #[error("failed to connect to redis at startup: {0}")]
    Redis(String),
    #[error("failed to connect to postgres at startup: {0}")]
    Postgres(String),
}

impl ErrorCode for FatalInitError {
    fn code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "FATAL_INIT_REDIS",
            Self::Postgres(_) => "FATAL_INIT_POSTGRES",
        }
    }
}

/// Unified error type bridging the taxonomy above for call sites that need
/// a single `Result` error (handler boundaries, `?`-propagation within a
/// single pipeline stage). Binaries (worker main loop, CLI) use `anyhow`
/// on top of this for contexts that never need to match on a variant.
#[derive(Debug, Error)]
pub enum FraudError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("transient infrastructure error: {0}")]
    Infra(#[from] TransientInfrastructureError),
    #[error("rule evaluation error: {0}")]
    Rule(#[from] RuleEvaluationError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigurationError),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("fatal initialization error: {0}")]
    FatalInit(#[from] FatalInitError),
}

impl ErrorCode for FraudError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::Infra(e) => e.code(),
            Self::Rule(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Dispatch(e) => e.code(),
            Self::FatalInit(e) => e.code(),
        }
    }
}
