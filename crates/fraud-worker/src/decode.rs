//! Path: crates/fraud-worker/src/decode.rs
//! Inverse of `fraud-ingest`'s stream-entry encoding: turns the string field
//! map read back off the transactions stream into a `Transaction` (§4.2,
//! §4.3 step 2). Worker-owned fields (`is_fraud`, `is_reviewed`, `status`)
//! are never present on the wire and are left at their defaults.
use chrono::{DateTime, Utc};
use fraud_types::model::{DeviceUsed, Transaction, TransactionType};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A stream entry missing a required field or carrying an unparseable one.
/// The caller logs this, acks the entry anyway, and moves on — a malformed
/// entry will never become parseable by being re-delivered.
#[derive(Debug, thiserror::Error)]
#[error("malformed stream entry: {0}")]
pub struct DecodeError(pub String);

fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, DecodeError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| DecodeError(format!("missing field {name}")))
}

pub fn decode(fields: &HashMap<String, String>) -> Result<Transaction, DecodeError> {
    let transaction_id = required(fields, "transaction_id")?.to_string();
    let correlation_id = required(fields, "correlation_id")?.to_string();
    let timestamp = DateTime::parse_from_rfc3339(required(fields, "timestamp")?)
        .map_err(|e| DecodeError(format!("timestamp: {e}")))?
        .with_timezone(&Utc);
    let sender_account = required(fields, "sender_account")?.to_string();
    let receiver_account = required(fields, "receiver_account")?.to_string();
    let amount = Decimal::from_str(required(fields, "amount")?)
        .map_err(|e| DecodeError(format!("amount: {e}")))?;
    let recalc = fields.get("recalc").map(String::as_str) == Some("1");

    let transaction_type = fields.get("transaction_type").and_then(|s| match s.as_str() {
        "withdrawal" => Some(TransactionType::Withdrawal),
        "deposit" => Some(TransactionType::Deposit),
        "transfer" => Some(TransactionType::Transfer),
        "payment" => Some(TransactionType::Payment),
        _ => None,
    });
    let device_used = fields.get("device_used").and_then(|s| match s.as_str() {
        "mobile" => Some(DeviceUsed::Mobile),
        "atm" => Some(DeviceUsed::Atm),
        "pos" => Some(DeviceUsed::Pos),
        "web" => Some(DeviceUsed::Web),
        _ => None,
    });

    Ok(Transaction {
        transaction_id,
        correlation_id,
        timestamp,
        sender_account,
        receiver_account,
        amount,
        transaction_type,
        merchant_category: fields.get("merchant_category").cloned(),
        location: fields.get("location").cloned(),
        device_used,
        time_since_last_transaction: fields.get("time_since_last_transaction").and_then(|s| s.parse().ok()),
        spending_deviation_score: fields.get("spending_deviation_score").and_then(|s| s.parse().ok()),
        velocity_score: fields.get("velocity_score").and_then(|s| s.parse().ok()),
        geo_anomaly_score: fields.get("geo_anomaly_score").and_then(|s| s.parse().ok()),
        payment_channel: fields.get("payment_channel").cloned(),
        ip_address: fields.get("ip_address").and_then(|s| Ipv4Addr::from_str(s).ok()),
        device_hash: fields.get("device_hash").cloned(),
        is_fraud: false,
        is_reviewed: false,
        status: Default::default(),
        recalc,
        extra: serde_json::Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> HashMap<String, String> {
        let mut f = HashMap::new();
        f.insert("transaction_id".into(), "T1".into());
        f.insert("correlation_id".into(), "C1".into());
        f.insert("timestamp".into(), "2025-01-01T12:00:00Z".into());
        f.insert("sender_account".into(), "ACC1".into());
        f.insert("receiver_account".into(), "ACC2".into());
        f.insert("amount".into(), "1500.00".into());
        f.insert("recalc".into(), "0".into());
        f.insert("transaction_type".into(), "transfer".into());
        f.insert("device_used".into(), "web".into());
        f
    }

    #[test]
    fn decodes_the_required_and_optional_fields() {
        let tx = decode(&sample_fields()).unwrap();
        assert_eq!(tx.transaction_id, "T1");
        assert_eq!(tx.transaction_type, Some(TransactionType::Transfer));
        assert_eq!(tx.device_used, Some(DeviceUsed::Web));
        assert!(!tx.recalc);
    }

    #[test]
    fn recalc_flag_round_trips() {
        let mut fields = sample_fields();
        fields.insert("recalc".into(), "1".into());
        assert!(decode(&fields).unwrap().recalc);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut fields = sample_fields();
        fields.remove("amount");
        assert!(decode(&fields).is_err());
    }
}
