//! Path: crates/fraud-dispatcher/src/lib.rs
//! The alert dispatcher (§4.4): a bounded pool of workers draining
//! `alerts_queue` and POSTing to the configured webhook. Best-effort,
//! no-retry delivery — the upstream enqueue is already deduped, not durable.

/// One dispatcher worker's blocking-pop-then-POST loop.
pub mod dispatch;
