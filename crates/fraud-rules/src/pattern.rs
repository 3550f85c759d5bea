//! Path: crates/fraud-rules/src/pattern.rs
//! Pattern / windowed-aggregation rule evaluation (SPEC_FULL.md §4.3.3).
use fraud_types::model::{GroupMode, PatternRule, Transaction};
use std::collections::HashMap;

/// Aggregated `(count, total, max)` for one group, accumulated from
/// persisted rows by `fraud-store` over the rule set's widest window.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupStat {
    pub count: u64,
    pub total: f64,
    pub max: f64,
}

/// The three group-mode aggregate tables for one worker batch, keyed by
/// `group_key`. Populated once per batch by the caller (one DB round trip
/// per group mode actually referenced by the active pattern rules), then
/// consulted for every transaction in the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchAggregates {
    sender: HashMap<String, GroupStat>,
    receiver: HashMap<String, GroupStat>,
    pair: HashMap<String, GroupStat>,
    /// The widest `window_seconds` across this batch's active pattern
    /// rules — the same `W` used for the aggregate fetch's `window_start`,
    /// reused here so the reason string reports the batch-wide window
    /// rather than whichever rule happens to be evaluated.
    max_window_seconds: i64,
}

impl BatchAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mode: GroupMode, key: String, stat: GroupStat) {
        let table = match mode {
            GroupMode::Sender => &mut self.sender,
            GroupMode::Receiver => &mut self.receiver,
            GroupMode::Pair => &mut self.pair,
        };
        table.insert(key, stat);
    }

    pub fn set_max_window_seconds(&mut self, seconds: i64) {
        self.max_window_seconds = seconds;
    }

    fn table(&self, mode: GroupMode) -> &HashMap<String, GroupStat> {
        match mode {
            GroupMode::Sender => &self.sender,
            GroupMode::Receiver => &self.receiver,
            GroupMode::Pair => &self.pair,
        }
    }

    /// Looks up the persisted stat for `tx`'s group under `mode`, defaulting
    /// to zero when the group had no persisted rows in the window.
    pub fn lookup(&self, mode: GroupMode, tx: &Transaction) -> GroupStat {
        self.table(mode)
            .get(&group_key(mode, tx))
            .copied()
            .unwrap_or_default()
    }
}

/// The key a transaction maps to under a given group mode. `fraud-store`'s
/// aggregate queries must key their result rows identically.
pub fn group_key(mode: GroupMode, tx: &Transaction) -> String {
    match mode {
        GroupMode::Sender => tx.sender_account.clone(),
        GroupMode::Receiver => tx.receiver_account.clone(),
        GroupMode::Pair => format!("{}|{}", tx.sender_account, tx.receiver_account),
    }
}

/// The account-qualified group label used in a pattern rule's reason
/// string, e.g. `sender=ACC1`, `receiver=ACC2`, `pair=ACC1->ACC2`.
fn group_label(mode: GroupMode, tx: &Transaction) -> String {
    match mode {
        GroupMode::Sender => format!("sender={}", tx.sender_account),
        GroupMode::Receiver => format!("receiver={}", tx.receiver_account),
        GroupMode::Pair => format!("pair={}->{}", tx.sender_account, tx.receiver_account),
    }
}

/// Renders a window length in minutes the way the original formats it: a
/// bare integer when the window divides evenly into minutes, otherwise one
/// decimal place.
fn window_minutes_text(window_seconds: i64) -> String {
    let minutes = window_seconds as f64 / 60.0;
    if window_seconds % 60 == 0 {
        format!("{}", window_seconds / 60)
    } else {
        format!("{minutes:.1}")
    }
}

/// Evaluates a pattern rule, folding `tx` itself into its group's
/// pre-aggregated stat before applying thresholds (§4.3.3: "including `t`").
pub fn evaluate(rule: &PatternRule, tx: &Transaction, aggregates: &BatchAggregates) -> (bool, String) {
    use rust_decimal::prelude::ToPrimitive;

    let stat = aggregates.lookup(rule.group_mode, tx);
    let amount = tx.amount.to_f64().unwrap_or(0.0);
    let count = stat.count + 1;
    let total = stat.total + amount;
    let max_amount = stat.max.max(amount);

    let count_ok = count as u32 >= rule.min_count;
    let total_ok = rule.total_amount_limit.map_or(true, |limit| total <= limit);
    // `min_amount_limit` is a ceiling on the largest single amount, not a
    // floor, despite the name (SPEC_FULL.md open-question decision #1).
    let max_ok = rule.min_amount_limit.map_or(true, |limit| max_amount <= limit);
    let fired = count_ok && total_ok && max_ok;

    let mm_txt = window_minutes_text(aggregates.max_window_seconds);
    let reason = format!(
        "{count} transactions in {mm_txt} min, total={total:.2}, max_amount={max_amount:.2} ({})",
        group_label(rule.group_mode, tx)
    );
    (fired, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fraud_types::model::TransactionStatus;
    use rust_decimal::Decimal;

    fn tx_from(sender: &str, amount: i64) -> Transaction {
        Transaction {
            transaction_id: "T3".into(),
            correlation_id: "C3".into(),
            timestamp: Utc::now(),
            sender_account: sender.into(),
            receiver_account: "ACC2".into(),
            amount: Decimal::new(amount, 2),
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
    fn fires_when_including_self_meets_min_count() {
        let rule = PatternRule {
            window_seconds: 300,
            min_count: 3,
            total_amount_limit: None,
            min_amount_limit: None,
            group_mode: GroupMode::Sender,
        };
        let mut aggregates = BatchAggregates::new();
        aggregates.set_max_window_seconds(300);
        aggregates.insert(
            GroupMode::Sender,
            "ACC9".to_string(),
            GroupStat {
                count: 2,
                total: 300.0,
                max: 150.0,
            },
        );
        let (fired, reason) = evaluate(&rule, &tx_from("ACC9", 5000), &aggregates);
        assert!(fired);
        assert!(reason.starts_with("3 transactions in 5 min"));
        assert!(reason.contains("sender=ACC9"));
    }

    #[test]
    fn non_whole_minute_window_renders_one_decimal_place() {
        // 90s does not divide evenly by 60, so the window text must be
        // "1.5", not an `{:.0}`-rounded "2".
        let rule = PatternRule {
            window_seconds: 90,
            min_count: 1,
            total_amount_limit: None,
            min_amount_limit: None,
            group_mode: GroupMode::Receiver,
        };
        let mut aggregates = BatchAggregates::new();
        aggregates.set_max_window_seconds(90);
        let (fired, reason) = evaluate(&rule, &tx_from("ACC1", 1000), &aggregates);
        assert!(fired);
        assert!(reason.contains("in 1.5 min"), "reason was: {reason}");
        assert!(reason.contains("receiver=ACC2"));
    }

    #[test]
    fn whole_minute_window_renders_as_a_bare_integer() {
        let rule = PatternRule {
            window_seconds: 120,
            min_count: 1,
            total_amount_limit: None,
            min_amount_limit: None,
            group_mode: GroupMode::Pair,
        };
        let mut aggregates = BatchAggregates::new();
        aggregates.set_max_window_seconds(120);
        let (fired, reason) = evaluate(&rule, &tx_from("ACC1", 1000), &aggregates);
        assert!(fired);
        assert!(reason.contains("in 2 min"), "reason was: {reason}");
        assert!(!reason.contains("2.0"));
        assert!(reason.contains("pair=ACC1->ACC2"));
    }

    #[test]
    fn min_amount_limit_is_a_ceiling_not_a_floor() {
        let rule = PatternRule {
            window_seconds: 60,
            min_count: 1,
            total_amount_limit: None,
            min_amount_limit: Some(100.0),
            group_mode: GroupMode::Sender,
        };
        let aggregates = BatchAggregates::new();
        let (fired, _) = evaluate(&rule, &tx_from("ACC1", 20000), &aggregates);
        assert!(!fired, "a single 200.00 transaction must breach a 100.0 ceiling");
    }
}
