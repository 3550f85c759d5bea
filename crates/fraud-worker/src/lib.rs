//! Path: crates/fraud-worker/src/lib.rs
//! The evaluation worker (§4.3): consumes the transactions stream as a
//! consumer-group member, applies the active rule snapshot to each batch,
//! persists fresh rows and promotes recalc'd ones, and enqueues alerts for
//! every transaction that triggered at least one rule.

/// Decodes a stream entry's field map back into a `Transaction`.
pub mod decode;
/// Process-wide rule snapshot with TTL and pub/sub invalidation.
pub mod rule_cache;
/// Alert payload construction, SHA-1 dedup, and queue fan-out (§4.4).
pub mod alert;
/// The main loop (§4.3 steps 1-10).
pub mod run;
