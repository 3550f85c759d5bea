//! Path: crates/fraud-rules/src/lib.rs
//! Threshold, composite, pattern, and ML rule-evaluation kernel
//! (SPEC_FULL.md §4.3.2-4.3.4). Pure: no I/O. Callers supply a batch's
//! pre-aggregated pattern stats and a per-transaction cached ML
//! probability; this crate only decides what fires and why.
pub mod composite;
pub mod ml;
pub mod pattern;
pub mod threshold;

pub use ml::MlOutcome;
pub use pattern::{group_key, BatchAggregates, GroupStat};

use fraud_types::config::StopMode;
use fraud_types::error::RuleEvaluationError;
use fraud_types::model::{Criticality, Rule, RuleKind, Transaction, TriggeredRule};

/// The result of applying one rule snapshot to one transaction.
#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    pub triggered: Vec<TriggeredRule>,
    pub max_criticality: Criticality,
    /// `(rule_id, rendered_input)` pairs for ML rules that missed the
    /// probability cache and must be enqueued onto `ml_eval_queue`.
    pub ml_pending: Vec<(i64, String)>,
    /// Advisory-only outcomes for every ML rule reached before any
    /// early-stop, kept for logging; never consulted for alerting.
    pub ml_outcomes: Vec<MlOutcome>,
    /// Non-fatal per-rule evaluation errors (§7 RuleEvaluationError),
    /// surfaced for the caller to log and feed into error metrics.
    pub errors: Vec<(i64, RuleEvaluationError)>,
}

/// Applies every active rule in `rules` (assumed already snapshot-filtered
/// and sorted per §4.3.1) to `tx`, honoring `stop_mode`'s early-stop for the
/// threshold/composite/pattern pass, then runs every active ML rule in a
/// second, advisory-only pass (§4.3.2, §4.3.4).
///
/// The ML pass is independent of the eager pass's early-stop: it is built
/// from the full active-rule snapshot up front, not from whichever ML rules
/// the eager loop happened to reach before `break`.
pub fn apply_rules(
    tx: &Transaction,
    rules: &[Rule],
    aggregates: &BatchAggregates,
    ml_probability: Option<f64>,
    stop_mode: StopMode,
    stop_criticality: u8,
) -> EvaluationOutcome {
    let mut outcome = EvaluationOutcome::default();
    let ml_rules: Vec<(i64, &Rule)> = rules
        .iter()
        .filter(|r| r.is_active && matches!(r.kind, RuleKind::Ml(_)))
        .map(|r| (r.id, r))
        .collect();
    let mut stopped = false;

    for rule in rules {
        if stopped {
            break;
        }
        if !rule.is_active {
            continue;
        }

        match &rule.kind {
            RuleKind::Threshold(t) => match threshold::evaluate(t, tx) {
                Ok((fired, reason)) => {
                    if fired {
                        push_triggered(&mut outcome, rule, "threshold", reason);
                    }
                }
                Err(e) => outcome.errors.push((rule.id, e)),
            },
            RuleKind::Composite(c) => {
                let (fired, reason) = composite::evaluate(&c.rule, tx);
                if fired {
                    push_triggered(&mut outcome, rule, "composite", reason);
                }
            }
            RuleKind::Pattern(p) => {
                let (fired, reason) = pattern::evaluate(p, tx, aggregates);
                if fired {
                    push_triggered(&mut outcome, rule, "pattern", reason);
                }
            }
            RuleKind::Ml(_) => {}
        }

        if stop_mode == StopMode::Critical {
            if let Some(last) = outcome.triggered.last() {
                if last.criticality.level() >= stop_criticality {
                    stopped = true;
                }
            }
        }
    }

    for (rule_id, rule) in ml_rules {
        if let RuleKind::Ml(ml_rule) = &rule.kind {
            let (ml_outcome, pending) = ml::evaluate(rule_id, ml_rule, tx, ml_probability);
            if let Some(rendered) = pending {
                outcome.ml_pending.push((rule_id, rendered));
            }
            outcome.ml_outcomes.push(ml_outcome);
        }
    }

    outcome
}

fn push_triggered(outcome: &mut EvaluationOutcome, rule: &Rule, kind: &'static str, reason: String) {
    outcome.triggered.push(TriggeredRule {
        id: rule.id,
        kind,
        title: rule.title.clone(),
        criticality: rule.criticality,
        reason,
    });
    if rule.criticality > outcome.max_criticality {
        outcome.max_criticality = rule.criticality;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fraud_types::model::{Operator, RuleKind, ThresholdRule, TransactionStatus};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn tx() -> Transaction {
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

    fn threshold_rule(id: i64, criticality: Criticality, value: f64) -> Rule {
        Rule {
            id,
            title: format!("rule-{id}"),
            description: None,
            is_active: true,
            criticality,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            kind: RuleKind::Threshold(ThresholdRule {
                column_name: "amount".into(),
                operator: Operator::Gt,
                value,
            }),
        }
    }

    #[test]
    fn early_stop_on_critical_skips_later_rules() {
        let rules = vec![
            threshold_rule(1, Criticality::Critical, 1000.0),
            threshold_rule(2, Criticality::Low, 0.0),
        ];
        let aggregates = BatchAggregates::new();
        let outcome = apply_rules(&tx(), &rules, &aggregates, None, StopMode::Critical, 4);
        assert_eq!(outcome.triggered.len(), 1);
        assert_eq!(outcome.triggered[0].id, 1);
    }

    #[test]
    fn stop_mode_never_evaluates_every_rule() {
        let rules = vec![
            threshold_rule(1, Criticality::Critical, 1000.0),
            threshold_rule(2, Criticality::Low, 0.0),
        ];
        let aggregates = BatchAggregates::new();
        let outcome = apply_rules(&tx(), &rules, &aggregates, None, StopMode::Never, 4);
        assert_eq!(outcome.triggered.len(), 2);
    }

    #[test]
    fn ml_rules_always_run_regardless_of_early_stop() {
        let mut rules = vec![threshold_rule(1, Criticality::Critical, 1000.0)];
        rules.push(Rule {
            id: 2,
            title: "ml-rule".into(),
            description: None,
            is_active: true,
            criticality: Criticality::Medium,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            kind: RuleKind::Ml(fraud_types::model::MlRule {
                model_name: "m".into(),
                input_template: "{amount}".into(),
                threshold: 0.5,
            }),
        });
        let aggregates = BatchAggregates::new();
        let outcome = apply_rules(&tx(), &rules, &aggregates, None, StopMode::Critical, 4);
        // the eager pass stops after rule 1 (critical), but the ML rule is
        // built from the full active snapshot and still runs.
        assert_eq!(outcome.triggered.len(), 1);
        assert_eq!(outcome.ml_outcomes.len(), 1);
    }

    proptest::proptest! {
        /// §8 round-trip property: `threshold({c:x}, c, x, op) == op(x, x)` for every
        /// comparison operator and every finite `x`.
        #[test]
        fn threshold_on_equal_operands_matches_operator_identity(x in -1.0e9f64..1.0e9f64) {
            for op in [Operator::Gt, Operator::Ge, Operator::Lt, Operator::Le, Operator::Eq, Operator::Ne] {
                let rule = ThresholdRule { column_name: "amount".into(), operator: op, value: x };
                let mut t = tx();
                t.amount = rust_decimal::Decimal::from_f64_retain(x).unwrap_or_default();
                let (fired, _) = threshold::evaluate(&rule, &t).unwrap();
                prop_assert_eq!(fired, op.apply_f64(x, x));
            }
        }

        /// §8 round-trip property: `NOT(NOT(X)) == X` for an arbitrary threshold leaf.
        #[test]
        fn double_not_is_identity(x in -1.0e6f64..1.0e6f64, threshold_value in -1.0e6f64..1.0e6f64) {
            use fraud_types::model::{Logic, Tree};
            let mut t = tx();
            t.amount = rust_decimal::Decimal::from_f64_retain(x).unwrap_or_default();
            let leaf = Tree::Leaf {
                column: "amount".to_string(),
                operator: Operator::Gt,
                value: serde_json::json!(threshold_value),
            };
            let double_not = Tree::Node {
                logic: Logic::Not,
                conditions: vec![Tree::Node { logic: Logic::Not, conditions: vec![leaf.clone()] }],
            };
            prop_assert_eq!(composite::evaluate(&leaf, &t).0, composite::evaluate(&double_not, &t).0);
        }
    }
}
