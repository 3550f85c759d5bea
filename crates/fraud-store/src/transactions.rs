//! Path: crates/fraud-store/src/transactions.rs
//! The Transaction Store: bulk insert, status promotion, existence lookup
//! for auto/recalc mode, pattern-rule batch pre-aggregation, and the
//! read/update surface behind `/api/transactions/...` (§4.3, §6).
use chrono::{DateTime, Utc};
use fraud_rules::{BatchAggregates, GroupStat};
use fraud_types::error::TransientInfrastructureError;
use fraud_types::model::{DeviceUsed, GroupMode, Transaction, TransactionStatus, TransactionType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

fn infra_err(context: &str, e: sqlx::Error) -> TransientInfrastructureError {
    TransientInfrastructureError::Database(format!("{context}: {e}"))
}

/// Inserts a batch in chunks, each wrapped in its own short-timeout
/// transaction (§4.3 step 7: `lock_timeout=5s`, `statement_timeout=30s`).
/// A chunk that fails is logged and skipped — the loop continues with the
/// next chunk rather than aborting the whole batch (§9 open-question
/// decision #2: the original's mis-indented `continue` is fixed, not
/// reproduced).
pub async fn bulk_insert_chunks(
    pool: &PgPool,
    transactions: &[Transaction],
    chunk_size: usize,
) -> BulkInsertOutcome {
    let mut outcome = BulkInsertOutcome::default();
    for chunk in transactions.chunks(chunk_size.max(1)) {
        match insert_chunk(pool, chunk).await {
            Ok(n) => outcome.inserted += n,
            Err(e) => {
                tracing::warn!(event = "bulk_insert_chunk_failed", error = %e, chunk_len = chunk.len());
                outcome.failed_chunks += 1;
                continue;
            }
        }
    }
    outcome
}

#[derive(Debug, Default)]
pub struct BulkInsertOutcome {
    pub inserted: usize,
    pub failed_chunks: usize,
}

async fn insert_chunk(pool: &PgPool, chunk: &[Transaction]) -> Result<usize, TransientInfrastructureError> {
    if chunk.is_empty() {
        return Ok(0);
    }
    let mut conn = pool.begin().await.map_err(|e| infra_err("insert_chunk/begin", e))?;
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *conn)
        .await
        .map_err(|e| infra_err("insert_chunk/lock_timeout", e))?;
    sqlx::query("SET LOCAL statement_timeout = '30s'")
        .execute(&mut *conn)
        .await
        .map_err(|e| infra_err("insert_chunk/statement_timeout", e))?;

    let ids: Vec<&str> = chunk.iter().map(|t| t.transaction_id.as_str()).collect();
    let cids: Vec<&str> = chunk.iter().map(|t| t.correlation_id.as_str()).collect();
    let timestamps: Vec<DateTime<Utc>> = chunk.iter().map(|t| t.timestamp).collect();
    let senders: Vec<&str> = chunk.iter().map(|t| t.sender_account.as_str()).collect();
    let receivers: Vec<&str> = chunk.iter().map(|t| t.receiver_account.as_str()).collect();
    let amounts: Vec<Decimal> = chunk.iter().map(|t| t.amount).collect();
    let types: Vec<Option<&str>> = chunk.iter().map(|t| t.transaction_type.map(|x| x.as_label())).collect();
    let merchants: Vec<Option<&str>> = chunk.iter().map(|t| t.merchant_category.as_deref()).collect();
    let locations: Vec<Option<&str>> = chunk.iter().map(|t| t.location.as_deref()).collect();
    let devices: Vec<Option<&str>> = chunk.iter().map(|t| t.device_used.map(|x| x.as_label())).collect();
    let tslt: Vec<Option<f64>> = chunk.iter().map(|t| t.time_since_last_transaction).collect();
    let sds: Vec<Option<f64>> = chunk.iter().map(|t| t.spending_deviation_score).collect();
    let vs: Vec<Option<f64>> = chunk.iter().map(|t| t.velocity_score).collect();
    let gas: Vec<Option<f64>> = chunk.iter().map(|t| t.geo_anomaly_score).collect();
    let channels: Vec<Option<&str>> = chunk.iter().map(|t| t.payment_channel.as_deref()).collect();
    let ips: Vec<Option<String>> = chunk.iter().map(|t| t.ip_address.map(|ip| ip.to_string())).collect();
    let hashes: Vec<Option<&str>> = chunk.iter().map(|t| t.device_hash.as_deref()).collect();
    let is_fraud: Vec<bool> = chunk.iter().map(|t| t.is_fraud).collect();
    let is_reviewed: Vec<bool> = chunk.iter().map(|t| t.is_reviewed).collect();
    let statuses: Vec<&str> = chunk.iter().map(|t| status_label(t.status)).collect();

    let result = sqlx::query(
        "INSERT INTO transactions (transaction_id, correlation_id, timestamp, sender_account, receiver_account, \
            amount, transaction_type, merchant_category, location, device_used, time_since_last_transaction, \
            spending_deviation_score, velocity_score, geo_anomaly_score, payment_channel, ip_address, device_hash, \
            is_fraud, is_reviewed, status) \
         SELECT * FROM UNNEST( \
            $1::text[], $2::text[], $3::timestamptz[], $4::text[], $5::text[], $6::numeric[], $7::text[], \
            $8::text[], $9::text[], $10::text[], $11::float8[], $12::float8[], $13::float8[], $14::float8[], \
            $15::text[], $16::text[], $17::text[], $18::bool[], $19::bool[], $20::text[]) \
         ON CONFLICT (transaction_id) DO NOTHING",
    )
    .bind(&ids)
    .bind(&cids)
    .bind(&timestamps)
    .bind(&senders)
    .bind(&receivers)
    .bind(&amounts)
    .bind(&types)
    .bind(&merchants)
    .bind(&locations)
    .bind(&devices)
    .bind(&tslt)
    .bind(&sds)
    .bind(&vs)
    .bind(&gas)
    .bind(&channels)
    .bind(&ips)
    .bind(&hashes)
    .bind(&is_fraud)
    .bind(&is_reviewed)
    .bind(&statuses)
    .execute(&mut *conn)
    .await
    .map_err(|e| infra_err("insert_chunk/insert", e))?;

    conn.commit().await.map_err(|e| infra_err("insert_chunk/commit", e))?;
    Ok(result.rows_affected() as usize)
}

fn status_label(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Processed => "processed",
        TransactionStatus::Alerted => "alerted",
    }
}

/// Promotes previously-`processed` rows to `alerted`, in the single
/// direction the spec's invariant allows (§3, §4.3 step 8).
pub async fn promote_to_alerted(pool: &PgPool, ids: &[String]) -> Result<u64, TransientInfrastructureError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("UPDATE transactions SET status = 'alerted' WHERE transaction_id = ANY($1) AND status = 'processed'")
        .bind(ids)
        .execute(pool)
        .await
        .map_err(|e| infra_err("promote_to_alerted", e))?;
    Ok(result.rows_affected())
}

/// Returns the subset of `ids` that already have a persisted row, for the
/// ingestion service's `auto` mode routing (§4.1 step 7).
pub async fn existing_ids(pool: &PgPool, ids: &[String]) -> Result<HashSet<String>, TransientInfrastructureError> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let rows: Vec<(String,)> = sqlx::query_as("SELECT transaction_id FROM transactions WHERE transaction_id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(|e| infra_err("existing_ids", e))?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// The distinct group keys a worker batch's active pattern rules need
/// aggregated, built by the caller from the batch's transactions and the
/// group modes in play (§4.3.3: "the superset of groups referenced").
#[derive(Debug, Default)]
pub struct NeededGroups {
    pub senders: Vec<String>,
    pub receivers: Vec<String>,
    pub pairs: Vec<String>,
}

/// Issues up to three aggregate queries (one per group mode actually
/// needed), each filtered to `timestamp >= window_start`, and folds the
/// results into a `BatchAggregates` the rule kernel can consult directly.
/// This keeps DB cost O(unique groups) per batch rather than O(batch x rules)
/// (§4.3.3).
pub async fn fetch_pattern_aggregates(
    pool: &PgPool,
    needed: &NeededGroups,
    window_start: DateTime<Utc>,
) -> Result<BatchAggregates, TransientInfrastructureError> {
    let mut aggregates = BatchAggregates::new();

    if !needed.senders.is_empty() {
        let rows: Vec<(String, i64, Decimal, Decimal)> = sqlx::query_as(
            "SELECT sender_account, COUNT(*)::bigint, COALESCE(SUM(amount), 0), COALESCE(MAX(amount), 0) \
             FROM transactions WHERE timestamp >= $1 AND sender_account = ANY($2) GROUP BY sender_account",
        )
        .bind(window_start)
        .bind(&needed.senders)
        .fetch_all(pool)
        .await
        .map_err(|e| infra_err("fetch_pattern_aggregates/sender", e))?;
        for (key, count, total, max) in rows {
            aggregates.insert(GroupMode::Sender, key, to_stat(count, total, max));
        }
    }

    if !needed.receivers.is_empty() {
        let rows: Vec<(String, i64, Decimal, Decimal)> = sqlx::query_as(
            "SELECT receiver_account, COUNT(*)::bigint, COALESCE(SUM(amount), 0), COALESCE(MAX(amount), 0) \
             FROM transactions WHERE timestamp >= $1 AND receiver_account = ANY($2) GROUP BY receiver_account",
        )
        .bind(window_start)
        .bind(&needed.receivers)
        .fetch_all(pool)
        .await
        .map_err(|e| infra_err("fetch_pattern_aggregates/receiver", e))?;
        for (key, count, total, max) in rows {
            aggregates.insert(GroupMode::Receiver, key, to_stat(count, total, max));
        }
    }

    if !needed.pairs.is_empty() {
        let rows: Vec<(String, i64, Decimal, Decimal)> = sqlx::query_as(
            "SELECT sender_account || '|' || receiver_account AS pair_key, COUNT(*)::bigint, \
                    COALESCE(SUM(amount), 0), COALESCE(MAX(amount), 0) \
             FROM transactions WHERE timestamp >= $1 AND (sender_account || '|' || receiver_account) = ANY($2) \
             GROUP BY pair_key",
        )
        .bind(window_start)
        .bind(&needed.pairs)
        .fetch_all(pool)
        .await
        .map_err(|e| infra_err("fetch_pattern_aggregates/pair", e))?;
        for (key, count, total, max) in rows {
            aggregates.insert(GroupMode::Pair, key, to_stat(count, total, max));
        }
    }

    Ok(aggregates)
}

fn to_stat(count: i64, total: Decimal, max: Decimal) -> GroupStat {
    GroupStat {
        count: count.max(0) as u64,
        total: total.to_f64().unwrap_or(0.0),
        max: max.to_f64().unwrap_or(0.0),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SortOrder {
    DateAsc,
    DateDesc,
    AmtAsc,
    AmtDesc,
}

#[derive(Debug, Default)]
pub struct ListFilter {
    pub status: Option<TransactionStatus>,
    pub search: Option<String>,
    pub sort: Option<SortOrder>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(FromRow)]
struct TransactionRow {
    transaction_id: String,
    correlation_id: String,
    timestamp: DateTime<Utc>,
    sender_account: String,
    receiver_account: String,
    amount: Decimal,
    transaction_type: Option<String>,
    merchant_category: Option<String>,
    location: Option<String>,
    device_used: Option<String>,
    time_since_last_transaction: Option<f64>,
    spending_deviation_score: Option<f64>,
    velocity_score: Option<f64>,
    geo_anomaly_score: Option<f64>,
    payment_channel: Option<String>,
    ip_address: Option<String>,
    device_hash: Option<String>,
    is_fraud: bool,
    is_reviewed: bool,
    status: Option<String>,
}

impl TransactionRow {
    fn into_transaction(self) -> Transaction {
        Transaction {
            transaction_id: self.transaction_id,
            correlation_id: self.correlation_id,
            timestamp: self.timestamp,
            sender_account: self.sender_account,
            receiver_account: self.receiver_account,
            amount: self.amount,
            transaction_type: self.transaction_type.and_then(|s| match s.as_str() {
                "withdrawal" => Some(TransactionType::Withdrawal),
                "deposit" => Some(TransactionType::Deposit),
                "transfer" => Some(TransactionType::Transfer),
                "payment" => Some(TransactionType::Payment),
                _ => None,
            }),
            merchant_category: self.merchant_category,
            location: self.location,
            device_used: self.device_used.and_then(|s| match s.as_str() {
                "mobile" => Some(DeviceUsed::Mobile),
                "atm" => Some(DeviceUsed::Atm),
                "pos" => Some(DeviceUsed::Pos),
                "web" => Some(DeviceUsed::Web),
                _ => None,
            }),
            time_since_last_transaction: self.time_since_last_transaction,
            spending_deviation_score: self.spending_deviation_score,
            velocity_score: self.velocity_score,
            geo_anomaly_score: self.geo_anomaly_score,
            payment_channel: self.payment_channel,
            ip_address: self.ip_address.and_then(|s| Ipv4Addr::from_str(&s).ok()),
            device_hash: self.device_hash,
            is_fraud: self.is_fraud,
            is_reviewed: self.is_reviewed,
            status: match self.status.as_deref() {
                Some("alerted") => TransactionStatus::Alerted,
                _ => TransactionStatus::Processed,
            },
            recalc: false,
            extra: serde_json::Map::new(),
        }
    }
}

const TRANSACTION_COLUMNS: &str = "transaction_id, correlation_id, timestamp, sender_account, receiver_account, amount, \
    transaction_type, merchant_category, location, device_used, time_since_last_transaction, spending_deviation_score, \
    velocity_score, geo_anomaly_score, payment_channel, ip_address, device_hash, is_fraud, is_reviewed, status";

/// Paginated transaction listing for `GET /api/transactions/` (§6), with a
/// correlation-id substring search and four sort orders.
pub async fn list(pool: &PgPool, filter: &ListFilter) -> Result<Vec<Transaction>, TransientInfrastructureError> {
    let mut qb = sqlx::QueryBuilder::new(format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"));
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status_label(status));
    }
    if let Some(search) = &filter.search {
        qb.push(" AND correlation_id ILIKE ").push_bind(format!("%{search}%"));
    }
    let order = match filter.sort {
        Some(SortOrder::DateAsc) => " ORDER BY timestamp ASC",
        Some(SortOrder::DateDesc) | None => " ORDER BY timestamp DESC",
        Some(SortOrder::AmtAsc) => " ORDER BY amount ASC",
        Some(SortOrder::AmtDesc) => " ORDER BY amount DESC",
    };
    qb.push(order);
    qb.push(" LIMIT ").push_bind(filter.page_size.max(1));
    qb.push(" OFFSET ").push_bind((filter.page.max(0)) * filter.page_size.max(1));

    let rows: Vec<TransactionRow> = qb
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| infra_err("list", e))?;
    Ok(rows.into_iter().map(TransactionRow::into_transaction).collect())
}

/// Fetches a single transaction by correlation id (§6 `GET
/// /api/transactions/<cid>/`). Correlation id is not unique; the first
/// match by descending timestamp is returned.
pub async fn get_by_correlation_id(
    pool: &PgPool,
    correlation_id: &str,
) -> Result<Option<Transaction>, TransientInfrastructureError> {
    let row: Option<TransactionRow> = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE correlation_id = $1 ORDER BY timestamp DESC LIMIT 1"
    ))
    .bind(correlation_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| infra_err("get_by_correlation_id", e))?;
    Ok(row.map(TransactionRow::into_transaction))
}

/// Updates the operator-controlled review flags for every row matching
/// `correlation_id` (§6 `PUT /api/transactions/<cid>/status/`). Returns the
/// number of rows touched.
pub async fn update_review_flags(
    pool: &PgPool,
    correlation_id: &str,
    is_fraud: Option<bool>,
    is_reviewed: Option<bool>,
) -> Result<u64, TransientInfrastructureError> {
    let mut qb = sqlx::QueryBuilder::new("UPDATE transactions SET ");
    let mut any = false;
    if let Some(v) = is_fraud {
        qb.push("is_fraud = ").push_bind(v);
        any = true;
    }
    if let Some(v) = is_reviewed {
        if any {
            qb.push(", ");
        }
        qb.push("is_reviewed = ").push_bind(v);
        any = true;
    }
    if !any {
        return Ok(0);
    }
    qb.push(" WHERE correlation_id = ").push_bind(correlation_id.to_string());
    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(|e| infra_err("update_review_flags", e))?;
    Ok(result.rows_affected())
}
