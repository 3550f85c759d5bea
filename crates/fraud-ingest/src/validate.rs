//! Path: crates/fraud-ingest/src/validate.rs
//! §4.1 steps 5-6: chunked per-item validation and sanitisation. Invalid
//! items are dropped, not retried; at most 100 error previews survive into
//! the response.
use chrono::{DateTime, Utc};
use fraud_types::error::ValidationError;
use fraud_types::model::{DeviceUsed, Transaction, TransactionStatus, TransactionType};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub const MAX_ERROR_PREVIEWS: usize = 100;
const SAFE_TEXT_MAX_LEN: usize = 255;

static ACCOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ACC\d+$").expect("static regex"));

fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&c| !matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}'))
        .collect()
}

fn html_escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#x27;".to_string(),
            other => other.to_string(),
        })
        .collect()
}

/// Trims, strips control characters, then truncates to `SAFE_TEXT_MAX_LEN`
/// and HTML-escapes — the sanitisation rule for `location`/`merchant_category`.
fn sanitize_safe_text(raw: &str) -> String {
    let cleaned = strip_control_chars(raw.trim());
    let truncated: String = cleaned.chars().take(SAFE_TEXT_MAX_LEN).collect();
    html_escape(&truncated)
}

/// Trims and strips control characters only — for identifiers and other
/// fields that are not rendered as HTML.
fn sanitize_plain(raw: &str) -> String {
    strip_control_chars(raw.trim())
}

fn get_str(item: &serde_json::Value, field: &'static str) -> Result<String, ValidationError> {
    item.get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ValidationError::MissingField(field))
}

fn validate_account(raw: &str) -> Result<String, ValidationError> {
    let cleaned = sanitize_plain(raw);
    if ACCOUNT_RE.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(ValidationError::InvalidAccount(cleaned))
    }
}

fn validate_amount(item: &serde_json::Value) -> Result<Decimal, ValidationError> {
    let raw = item.get("amount").ok_or(ValidationError::MissingField("amount"))?;
    let decimal = match raw {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).map_err(|_| ValidationError::InvalidAmount)?,
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).map_err(|_| ValidationError::InvalidAmount)?,
        _ => return Err(ValidationError::InvalidAmount),
    };
    if decimal <= Decimal::ZERO || decimal.scale() > 2 {
        return Err(ValidationError::InvalidAmount);
    }
    let digits = decimal.mantissa().unsigned_abs().to_string().len();
    if digits > 12 {
        return Err(ValidationError::InvalidAmount);
    }
    Ok(decimal)
}

fn validate_timestamp(item: &serde_json::Value, now: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
    let raw = item
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or(ValidationError::MissingField("timestamp"))?;
    let ts = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidShape {
            field: "timestamp",
            reason: e.to_string(),
        })?;
    if ts > now {
        return Err(ValidationError::FutureTimestamp);
    }
    Ok(ts)
}

fn validate_ip(item: &serde_json::Value) -> Result<Option<Ipv4Addr>, ValidationError> {
    let Some(raw) = item.get("ip_address").and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let ip = Ipv4Addr::from_str(raw).map_err(|_| ValidationError::MalformedIp(raw.to_string()))?;
    if ip.is_unspecified() || ip == Ipv4Addr::BROADCAST {
        return Err(ValidationError::MalformedIp(raw.to_string()));
    }
    Ok(Some(ip))
}

fn coerce_score(item: &serde_json::Value, field: &str) -> Option<f64> {
    match item.get(field) {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn opt_enum<T: serde::de::DeserializeOwned>(item: &serde_json::Value, field: &str) -> Option<T> {
    item.get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase())).ok())
}

fn opt_text(item: &serde_json::Value, field: &str, sanitize: fn(&str) -> String) -> Option<String> {
    item.get(field)
        .and_then(|v| v.as_str())
        .map(sanitize)
        .filter(|s| !s.is_empty())
}

/// Validates and sanitises one raw ingestion item into a `Transaction`.
/// `time_since_last_transaction` defaults to `0.0` when absent, per §4.1
/// step 5.
pub fn validate_item(item: &serde_json::Value, now: DateTime<Utc>) -> Result<Transaction, ValidationError> {
    let transaction_id = sanitize_plain(&get_str(item, "transaction_id")?);
    let correlation_id = sanitize_plain(&get_str(item, "correlation_id")?);
    let sender_account = validate_account(&get_str(item, "sender_account")?)?;
    let receiver_account = validate_account(&get_str(item, "receiver_account")?)?;
    let amount = validate_amount(item)?;
    let timestamp = validate_timestamp(item, now)?;
    let ip_address = validate_ip(item)?;
    let recalc = matches!(item.get("recalc").and_then(|v| v.as_str()), Some("1"));

    Ok(Transaction {
        transaction_id,
        correlation_id,
        timestamp,
        sender_account,
        receiver_account,
        amount,
        transaction_type: opt_enum::<TransactionType>(item, "transaction_type"),
        merchant_category: opt_text(item, "merchant_category", sanitize_safe_text),
        location: opt_text(item, "location", sanitize_safe_text),
        device_used: opt_enum::<DeviceUsed>(item, "device_used"),
        time_since_last_transaction: Some(coerce_score(item, "time_since_last_transaction").unwrap_or(0.0)),
        spending_deviation_score: coerce_score(item, "spending_deviation_score"),
        velocity_score: coerce_score(item, "velocity_score"),
        geo_anomaly_score: coerce_score(item, "geo_anomaly_score"),
        payment_channel: opt_text(item, "payment_channel", sanitize_plain),
        ip_address,
        device_hash: opt_text(item, "device_hash", sanitize_plain),
        is_fraud: false,
        is_reviewed: false,
        status: TransactionStatus::Processed,
        recalc,
        extra: serde_json::Map::new(),
    })
}

/// One dropped item's index and reason, capped in the caller's response to
/// `MAX_ERROR_PREVIEWS` entries.
pub struct ValidationFailure {
    pub index: usize,
    pub error: ValidationError,
}

/// Validates `items` in chunks of `chunk_size`, returning the surviving
/// transactions and every failure (callers truncate previews themselves so
/// the full invalid count is still observable in metrics).
pub fn validate_chunked(
    items: &[serde_json::Value],
    chunk_size: usize,
    now: DateTime<Utc>,
) -> (Vec<Transaction>, Vec<ValidationFailure>) {
    let mut valid = Vec::with_capacity(items.len());
    let mut failures = Vec::new();
    for chunk in items.chunks(chunk_size.max(1)) {
        for (offset, item) in chunk.iter().enumerate() {
            match validate_item(item, now) {
                Ok(tx) => valid.push(tx),
                Err(error) => failures.push(ValidationFailure {
                    index: offset,
                    error,
                }),
            }
        }
    }
    (valid, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "transaction_id": "T1",
            "correlation_id": "C1",
            "sender_account": "ACC1001",
            "receiver_account": "ACC1002",
            "amount": "150.50",
            "timestamp": "2020-01-01T00:00:00Z",
        })
    }

    #[test]
    fn accepts_a_well_formed_item() {
        let now = Utc::now();
        assert!(validate_item(&sample(), now).is_ok());
    }

    #[test]
    fn rejects_malformed_account() {
        let mut item = sample();
        item["sender_account"] = json!("not-an-account");
        assert!(matches!(
            validate_item(&item, Utc::now()),
            Err(ValidationError::InvalidAccount(_))
        ));
    }

    #[test]
    fn rejects_future_timestamp() {
        let mut item = sample();
        item["timestamp"] = json!((Utc::now() + chrono::Duration::days(1)).to_rfc3339());
        assert!(matches!(validate_item(&item, Utc::now()), Err(ValidationError::FutureTimestamp)));
    }

    #[test]
    fn rejects_nonpositive_amount() {
        let mut item = sample();
        item["amount"] = json!("-5.00");
        assert!(matches!(validate_item(&item, Utc::now()), Err(ValidationError::InvalidAmount)));
    }

    #[test]
    fn rejects_broadcast_ip() {
        let mut item = sample();
        item["ip_address"] = json!("255.255.255.255");
        assert!(matches!(validate_item(&item, Utc::now()), Err(ValidationError::MalformedIp(_))));
    }

    #[test]
    fn defaults_time_since_last_transaction_to_zero() {
        let tx = validate_item(&sample(), Utc::now()).unwrap();
        assert_eq!(tx.time_since_last_transaction, Some(0.0));
    }

    #[test]
    fn html_escapes_and_caps_location() {
        let mut item = sample();
        item["location"] = json!("<script>alert(1)</script>".repeat(20));
        let tx = validate_item(&item, Utc::now()).unwrap();
        let location = tx.location.unwrap();
        assert!(location.len() <= SAFE_TEXT_MAX_LEN * 6);
        assert!(!location.contains("<script>"));
    }
}
