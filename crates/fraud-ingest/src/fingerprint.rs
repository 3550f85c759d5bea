//! Path: crates/fraud-ingest/src/fingerprint.rs
//! §4.1 step 2 / §9 "Batch fingerprint": SHA-1 of a sorted
//! `transaction_id|correlation_id` list, used to recognise resubmission of
//! an identical batch regardless of item order.
use sha1::{Digest, Sha1};

fn raw_str(item: &serde_json::Value, field: &str) -> String {
    item.get(field).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

pub fn batch_fingerprint(items: &[serde_json::Value]) -> String {
    let mut pairs: Vec<String> = items
        .iter()
        .map(|item| format!("{}|{}", raw_str(item, "transaction_id"), raw_str(item, "correlation_id")))
        .collect();
    pairs.sort();
    let mut hasher = Sha1::new();
    hasher.update(pairs.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_order_independent() {
        let a = vec![json!({"transaction_id": "t1", "correlation_id": "c1"}), json!({"transaction_id": "t2", "correlation_id": "c2"})];
        let b = vec![json!({"transaction_id": "t2", "correlation_id": "c2"}), json!({"transaction_id": "t1", "correlation_id": "c1"})];
        assert_eq!(batch_fingerprint(&a), batch_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = vec![json!({"transaction_id": "t1", "correlation_id": "c1"})];
        let b = vec![json!({"transaction_id": "t1", "correlation_id": "c2"})];
        assert_ne!(batch_fingerprint(&a), batch_fingerprint(&b));
    }
}
