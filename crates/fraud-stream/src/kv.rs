//! Path: crates/fraud-stream/src/kv.rs
//! Ephemeral key-value structures shared by the ingestion service, worker,
//! and dispatcher: idempotency cache, dedup token set, batch fingerprint
//! set, and the ML probability cache (§3, §4.1.1, §4.3.4, §4.4).
use crate::infra_err;
use fraud_types::error::TransientInfrastructureError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

pub struct KvClient {
    conn: ConnectionManager,
}

impl KvClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn idempotency_key(ns: &str, mode: &str, key: &str) -> String {
        format!("{ns}:{mode}:{key}")
    }

    /// Looks up a cached response for `(mode, key)` (§4.1 step 4).
    pub async fn idempotency_get(
        &mut self,
        ns: &str,
        mode: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, TransientInfrastructureError> {
        let raw: Option<String> = self
            .conn
            .get(Self::idempotency_key(ns, mode, key))
            .await
            .map_err(|e| infra_err("idempotency_get", e))?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    /// Caches a response under `(mode, key)` for `ttl_secs` seconds.
    pub async fn idempotency_set(
        &mut self,
        ns: &str,
        mode: &str,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: u64,
    ) -> Result<(), TransientInfrastructureError> {
        let body = serde_json::to_string(value).unwrap_or_default();
        let _: () = self
            .conn
            .set_ex(Self::idempotency_key(ns, mode, key), body, ttl_secs)
            .await
            .map_err(|e| infra_err("idempotency_set", e))?;
        Ok(())
    }

    /// Checks each token for prior membership in the dedup set and, for
    /// every token not already present, inserts it and refreshes the set's
    /// TTL. Returns a parallel `seen` mask: `seen[i]` is true if token `i`
    /// was already present before this call (§4.1.1). Tokens are formatted
    /// `"{field}:{value}"` by the caller (`token_for`) — this prefix
    /// convention is load-bearing, not cosmetic (SPEC_FULL.md open question #3).
    pub async fn dedup_check_and_insert(
        &mut self,
        set_key: &str,
        tokens: &[String],
        ttl_secs: u64,
    ) -> Result<Vec<bool>, TransientInfrastructureError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let seen: Vec<bool> = match self.conn.smismember(set_key, tokens).await {
            Ok(v) => v,
            Err(_) => {
                // SMISMEMBER unsupported by the server (old Redis); fall back
                // to a pipeline of individual SISMEMBER checks.
                let mut pipe = redis::pipe();
                for t in tokens {
                    pipe.sismember(set_key, t);
                }
                pipe.query_async(&mut self.conn)
                    .await
                    .map_err(|e| infra_err("dedup_check_and_insert/fallback", e))?
            }
        };
        let fresh: Vec<&String> = tokens
            .iter()
            .zip(seen.iter())
            .filter(|(_, s)| !**s)
            .map(|(t, _)| t)
            .collect();
        if !fresh.is_empty() {
            let _: () = self
                .conn
                .sadd(set_key, &fresh)
                .await
                .map_err(|e| infra_err("dedup_check_and_insert/sadd", e))?;
        }
        let _: () = self
            .conn
            .expire(set_key, ttl_secs as i64)
            .await
            .map_err(|e| infra_err("dedup_check_and_insert/expire", e))?;
        Ok(seen)
    }

    /// Formats a dedup token for `field`/`value`. The `"{field}:{value}"`
    /// prefix convention is part of the contract — see `dedup_check_and_insert`.
    pub fn token_for(field: &str, value: &str) -> String {
        format!("{field}:{value}")
    }

    /// Checks whether a batch fingerprint was already seen and, if not,
    /// records it with a TTL. Returns `true` if the fingerprint was already
    /// present (§4.1 step 3, §9 "Batch fingerprint").
    /// Checks whether `fingerprint` is already a member of the batch's
    /// "seen" set, without marking it seen. The caller only records it once
    /// the batch has actually been processed (`fingerprint_record`) — a
    /// batch that fails partway through must remain re-submittable.
    pub async fn fingerprint_seen(
        &mut self,
        ns: &str,
        fingerprint: &str,
    ) -> Result<bool, TransientInfrastructureError> {
        let set_key = format!("{ns}:seen_batches");
        self.conn
            .sismember(&set_key, fingerprint)
            .await
            .map_err(|e| infra_err("fingerprint_seen", e))
    }

    /// Marks `fingerprint` seen, with TTL renewal. Called only after the
    /// batch it identifies has been fully appended to the stream.
    pub async fn fingerprint_record(
        &mut self,
        ns: &str,
        fingerprint: &str,
        ttl_secs: u64,
    ) -> Result<(), TransientInfrastructureError> {
        let set_key = format!("{ns}:seen_batches");
        let _: () = self
            .conn
            .sadd(&set_key, fingerprint)
            .await
            .map_err(|e| infra_err("fingerprint_record/add", e))?;
        let _: () = self
            .conn
            .expire(&set_key, ttl_secs as i64)
            .await
            .map_err(|e| infra_err("fingerprint_record/expire", e))?;
        Ok(())
    }

    /// Reads a cached ML probability for a transaction (§4.3.4). Returns
    /// `None` on a cache miss (the caller must enqueue an evaluation
    /// request; it is never computed inline).
    pub async fn ml_probability(
        &mut self,
        tx_id: &str,
    ) -> Result<Option<f64>, TransientInfrastructureError> {
        let raw: Option<String> = self
            .conn
            .get(format!("ml:{tx_id}"))
            .await
            .map_err(|e| infra_err("ml_probability", e))?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    /// Checks the alert-dedup key for a canonicalised alert payload hash
    /// and, if absent, sets it with `ttl_secs` (§4.4). Returns `true` if an
    /// identical alert was already dispatched (caller should skip enqueue).
    pub async fn alert_dedup_check_and_set(
        &mut self,
        hash_hex: &str,
        ttl_secs: u64,
    ) -> Result<bool, TransientInfrastructureError> {
        let key = format!("alert:sent:{hash_hex}");
        // NX+EX in one round trip: SET key 1 NX EX ttl; returns nil if key
        // already existed, "OK" if it was just set.
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| infra_err("alert_dedup_check_and_set", e))?;
        Ok(result.is_none())
    }
}
