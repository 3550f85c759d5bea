//! Path: crates/fraud-rules/src/ml.rs
//! ML-scoring hook evaluation (SPEC_FULL.md §4.3.4). Always advisory: the
//! outcome here never feeds the triggered-rules list or status promotion.
use fraud_types::model::{MlRule, Transaction};

/// One ML rule's advisory outcome for a transaction, logged but never used
/// to decide status or alerting.
#[derive(Debug, Clone)]
pub struct MlOutcome {
    pub rule_id: i64,
    pub fired: bool,
    pub reason: String,
}

/// Resolves `{field}` placeholders in `template` against the transaction,
/// leaving unresolvable placeholders untouched.
fn render_template(template: &str, tx: &Transaction) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let field = &template[i + 1..i + 1 + end];
                match tx.field(field) {
                    Some(serde_json::Value::String(s)) => out.push_str(&s),
                    Some(v) => out.push_str(&v.to_string()),
                    None => out.push_str(&template[i..=i + 1 + end]),
                }
                i = i + 1 + end + 1;
                continue;
            }
        }
        let ch = template[i..].chars().next().expect("i in bounds");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Evaluates one ML rule for one transaction against an already-fetched
/// cache lookup. On a cache hit, compares the stored probability to the
/// rule's threshold. On a miss, returns the rendered request for the
/// caller to enqueue onto `ml_eval_queue`; the current evaluation pass
/// never blocks on inference.
pub fn evaluate(
    rule_id: i64,
    rule: &MlRule,
    tx: &Transaction,
    cached_probability: Option<f64>,
) -> (MlOutcome, Option<String>) {
    match cached_probability {
        Some(probability) => {
            let fired = probability >= rule.threshold;
            let reason = format!(
                "ml model {} probability {probability:.4} vs threshold {:.4}",
                rule.model_name, rule.threshold
            );
            (
                MlOutcome {
                    rule_id,
                    fired,
                    reason,
                },
                None,
            )
        }
        None => {
            let rendered = render_template(&rule.input_template, tx);
            (
                MlOutcome {
                    rule_id,
                    fired: false,
                    reason: "queued for ml evaluation, result pending".to_string(),
                },
                Some(rendered),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fraud_types::model::TransactionStatus;
    use rust_decimal::Decimal;

    fn base_tx() -> Transaction {
        Transaction {
            transaction_id: "T9".into(),
            correlation_id: "C9".into(),
            timestamp: Utc::now(),
            sender_account: "ACC1".into(),
            receiver_account: "ACC2".into(),
            amount: Decimal::new(10000, 2),
            transaction_type: None,
            merchant_category: Some("electronics".into()),
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
    fn cache_miss_enqueues_a_rendered_request_and_is_never_fired() {
        let rule = MlRule {
            model_name: "risk-v1".into(),
            input_template: "merchant={merchant_category} amount={amount}".into(),
            threshold: 0.8,
        };
        let (outcome, pending) = evaluate(1, &rule, &base_tx(), None);
        assert!(!outcome.fired);
        let rendered = pending.expect("must enqueue on cache miss");
        assert!(rendered.contains("electronics"));
    }

    #[test]
    fn cache_hit_compares_against_threshold() {
        let rule = MlRule {
            model_name: "risk-v1".into(),
            input_template: "{amount}".into(),
            threshold: 0.5,
        };
        let (outcome, pending) = evaluate(1, &rule, &base_tx(), Some(0.9));
        assert!(outcome.fired);
        assert!(pending.is_none());
    }
}
