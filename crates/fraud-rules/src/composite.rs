//! Path: crates/fraud-rules/src/composite.rs
//! Composite boolean-tree rule evaluation (SPEC_FULL.md §4.3.2). Walks the
//! tree iteratively with an explicit stack (§9 re-architecture item) rather
//! than recursively, so a pathological depth can't blow the call stack.
use fraud_types::model::{Logic, Operator, Transaction, Tree};

enum Work<'a> {
    Visit(&'a Tree),
    Combine(Logic, usize),
}

/// Evaluates a composite rule tree, returning whether it fired and an
/// aggregated reason string.
pub fn evaluate(tree: &Tree, tx: &Transaction) -> (bool, String) {
    let mut work = vec![Work::Visit(tree)];
    let mut results: Vec<(bool, String)> = Vec::new();

    while let Some(item) = work.pop() {
        match item {
            Work::Visit(Tree::Leaf {
                column,
                operator,
                value,
            }) => results.push(evaluate_leaf(column, *operator, value, tx)),
            Work::Visit(Tree::Node { logic, conditions }) => {
                if conditions.is_empty() {
                    results.push((false, "empty condition list".to_string()));
                    continue;
                }
                if *logic == Logic::Not && conditions.len() != 1 {
                    results.push((
                        false,
                        format!("NOT requires exactly one child, got {}", conditions.len()),
                    ));
                    continue;
                }
                work.push(Work::Combine(*logic, conditions.len()));
                for child in conditions.iter().rev() {
                    work.push(Work::Visit(child));
                }
            }
            Work::Combine(logic, n) => {
                let start = results.len() - n;
                let children = results.split_off(start);
                results.push(combine(logic, &children));
            }
        }
    }

    results
        .pop()
        .unwrap_or((false, "malformed composite tree".to_string()))
}

fn combine(logic: Logic, children: &[(bool, String)]) -> (bool, String) {
    match logic {
        Logic::And => {
            let fired = children.iter().all(|(f, _)| *f);
            let body: Vec<&str> = children.iter().map(|(_, r)| r.as_str()).collect();
            (
                fired,
                format!("AND({} → {})", body.join("; "), bool_label(fired)),
            )
        }
        Logic::Or => {
            let fired = children.iter().any(|(f, _)| *f);
            let body: Vec<&str> = children.iter().map(|(_, r)| r.as_str()).collect();
            (
                fired,
                format!("OR({} → {})", body.join("; "), bool_label(fired)),
            )
        }
        Logic::Not => {
            let (child_fired, child_reason) = &children[0];
            let fired = !child_fired;
            (
                fired,
                format!("NOT({} → {})", child_reason, bool_label(fired)),
            )
        }
    }
}

fn bool_label(fired: bool) -> &'static str {
    if fired {
        "True"
    } else {
        "False"
    }
}

fn evaluate_leaf(
    column: &str,
    operator: Operator,
    value: &serde_json::Value,
    tx: &Transaction,
) -> (bool, String) {
    let field = tx.field(column);
    let missing = match &field {
        None => true,
        Some(serde_json::Value::String(s)) => s.is_empty(),
        Some(serde_json::Value::Null) => true,
        _ => false,
    };
    if missing {
        return (false, format!("{column} missing"));
    }
    let field = field.expect("checked above");

    if let (Some(lhs), Some(rhs)) = (as_f64(&field), as_f64(value)) {
        let fired = operator.apply_f64(lhs, rhs);
        return (
            fired,
            format!(
                "{column} {} {:?} → {:?} → {}",
                operator.as_str(),
                rhs,
                lhs,
                bool_label(fired)
            ),
        );
    }

    let lhs = as_str(&field);
    let rhs = as_str(value);
    let fired = operator.apply_str(&lhs, &rhs);
    (
        fired,
        format!(
            "{column} {} {} → {} → {}",
            operator.as_str(),
            rhs,
            lhs,
            bool_label(fired)
        ),
    )
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
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
            transaction_id: "T2".into(),
            correlation_id: "C2".into(),
            timestamp: Utc::now(),
            sender_account: "ACC1".into(),
            receiver_account: "ACC2".into(),
            amount: Decimal::new(50000, 2),
            transaction_type: None,
            merchant_category: None,
            location: Some("Antarctica".into()),
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

    fn leaf(column: &str, operator: Operator, value: serde_json::Value) -> Tree {
        Tree::Leaf {
            column: column.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn or_fires_when_either_branch_fires() {
        let tree = Tree::Node {
            logic: Logic::Or,
            conditions: vec![
                leaf("amount", Operator::Gt, serde_json::json!(10000.0)),
                leaf("location", Operator::Eq, serde_json::json!("Antarctica")),
            ],
        };
        let (fired, reason) = evaluate(&tree, &base_tx());
        assert!(fired);
        assert!(reason.starts_with("OR("));
        assert!(reason.contains("True"));
    }

    #[test]
    fn not_negates_its_single_child() {
        let inner = leaf("amount", Operator::Gt, serde_json::json!(10000.0));
        let not_inner = Tree::Node {
            logic: Logic::Not,
            conditions: vec![inner.clone()],
        };
        let double_not = Tree::Node {
            logic: Logic::Not,
            conditions: vec![not_inner],
        };
        assert_eq!(evaluate(&inner, &base_tx()).0, evaluate(&double_not, &base_tx()).0);
    }

    #[test]
    fn empty_conditions_never_panics() {
        let tree = Tree::Node {
            logic: Logic::And,
            conditions: vec![],
        };
        let (fired, _) = evaluate(&tree, &base_tx());
        assert!(!fired);
    }

    #[test]
    fn missing_field_is_false_not_an_error() {
        let tree = leaf("spending_deviation_score", Operator::Gt, serde_json::json!(0.5));
        let (fired, reason) = evaluate(&tree, &base_tx());
        assert!(!fired);
        assert!(reason.contains("missing"));
    }
}
