//! Path: crates/fraud-rules/src/threshold.rs
//! Threshold rule evaluation (SPEC_FULL.md §4.3.2).
use fraud_types::error::RuleEvaluationError;
use fraud_types::model::{Operator, ThresholdRule, Transaction};

/// Coerces a transaction field to `f64`. An absent field coerces to `0.0`;
/// a present but non-numeric field is a coercion failure.
fn coerce_f64(tx: &Transaction, column: &str) -> Result<f64, RuleEvaluationError> {
    match tx.field(column) {
        None => Ok(0.0),
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| coercion_error(column)),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(0.0),
        Some(serde_json::Value::String(s)) => s.parse().map_err(|_| coercion_error(column)),
        Some(serde_json::Value::Bool(b)) => Ok(if b { 1.0 } else { 0.0 }),
        Some(_) => Err(coercion_error(column)),
    }
}

fn coercion_error(column: &str) -> RuleEvaluationError {
    RuleEvaluationError::Coercion {
        field: column.to_string(),
        reason: "field value could not be coerced to a number".to_string(),
    }
}

/// Evaluates a threshold rule against a transaction, returning whether it
/// fired and the human-readable reason string (§8 S1's literal format).
pub fn evaluate(
    rule: &ThresholdRule,
    tx: &Transaction,
) -> Result<(bool, String), RuleEvaluationError> {
    let actual = coerce_f64(tx, &rule.column_name)?;
    let fired = rule.operator.apply_f64(actual, rule.value);
    let reason = format!(
        "{} {} {:?} → {:?} → {}",
        rule.column_name,
        rule.operator.as_str(),
        rule.value,
        actual,
        if fired { "True" } else { "False" }
    );
    Ok((fired, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fraud_types::error::ErrorCode;
    use fraud_types::model::TransactionStatus;
    use rust_decimal::Decimal;

    fn base_tx() -> Transaction {
        Transaction {
            transaction_id: "T1".into(),
            correlation_id: "C1".into(),
            timestamp: Utc::now(),
            sender_account: "ACC1".into(),
            receiver_account: "ACC2".into(),
            amount: Decimal::new(150000, 2),
            transaction_type: None,
            merchant_category: None,
            location: None,
            device_used: None,
            time_since_last_transaction: None,
            spending_deviation_score: None,
            velocity_score: None,
            geo_anomaly_score: None,
            payment_channel: None,
            ip_address: None,
            device_hash: None,
            is_fraud: false,
            is_reviewed: false,
            status: TransactionStatus::Processed,
            recalc: false,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn fires_when_amount_exceeds_threshold() {
        let rule = ThresholdRule {
            column_name: "amount".into(),
            operator: Operator::Gt,
            value: 1000.0,
        };
        let (fired, reason) = evaluate(&rule, &base_tx()).unwrap();
        assert!(fired);
        assert!(reason.contains("1500"));
    }

    #[test]
    fn missing_field_coerces_to_zero() {
        let rule = ThresholdRule {
            column_name: "velocity_score".into(),
            operator: Operator::Eq,
            value: 0.0,
        };
        let (fired, _) = evaluate(&rule, &base_tx()).unwrap();
        assert!(fired);
    }

    #[test]
    fn non_numeric_field_is_a_coercion_error() {
        let rule = ThresholdRule {
            column_name: "location".into(),
            operator: Operator::Gt,
            value: 0.0,
        };
        let mut tx = base_tx();
        tx.location = Some("Antarctica".into());
        let err = evaluate(&rule, &tx).unwrap_err();
        assert_eq!(err.code(), "RULE_COERCION_FAILED");
        if let RuleEvaluationError::Coercion { reason, .. } = err {
            assert_eq!(reason, "field value could not be coerced to a number");
        } else {
            panic!("expected Coercion variant");
        }
    }
}
