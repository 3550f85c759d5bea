#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::unimplemented)
)]

//! Shared data model, error taxonomy, and environment-driven configuration
//! for the fraud-screening pipeline. Every crate in the workspace depends
//! on this one; it has no dependency on any other workspace crate.

/// Transaction, Rule, and supporting domain types.
pub mod model;
/// Error taxonomy (§7) shared across the ingestion service, worker, and dispatcher.
pub mod error;
/// Environment-variable configuration structs, one per binary.
pub mod config;

pub use error::{ErrorCode, FraudError};
pub use model::{Criticality, Rule, RuleKind, Transaction, TransactionStatus};
