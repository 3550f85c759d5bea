//! Path: crates/fraud-types/src/model.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Status assigned to a persisted transaction by the evaluation worker.
/// Mutates in exactly one direction: `Processed` -> `Alerted`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Processed,
    Alerted,
}

impl Default for TransactionStatus {
    fn default() -> Self {
        Self::Processed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Withdrawal,
    Deposit,
    Transfer,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceUsed {
    Mobile,
    Atm,
    Pos,
    Web,
}

impl TransactionType {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Withdrawal => "withdrawal",
            Self::Deposit => "deposit",
            Self::Transfer => "transfer",
            Self::Payment => "payment",
        }
    }
}

impl DeviceUsed {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Atm => "atm",
            Self::Pos => "pos",
            Self::Web => "web",
        }
    }
}

/// A payment transaction. Immutable once inserted except for `status`,
/// `is_fraud`, and `is_reviewed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub sender_account: String,
    pub receiver_account: String,
    pub amount: Decimal,
    pub transaction_type: Option<TransactionType>,
    pub merchant_category: Option<String>,
    pub location: Option<String>,
    pub device_used: Option<DeviceUsed>,
    pub time_since_last_transaction: Option<f64>,
    pub spending_deviation_score: Option<f64>,
    pub velocity_score: Option<f64>,
    pub geo_anomaly_score: Option<f64>,
    pub payment_channel: Option<String>,
    pub ip_address: Option<Ipv4Addr>,
    pub device_hash: Option<String>,
    #[serde(default)]
    pub is_fraud: bool,
    #[serde(default)]
    pub is_reviewed: bool,
    #[serde(default)]
    pub status: TransactionStatus,
    /// Set on stream entries that request re-evaluation of an existing row
    /// (§4.3.5 Recalc semantics) rather than a fresh insert. Not persisted.
    #[serde(default)]
    pub recalc: bool,
    /// Side-channel for attributes not named above, so unknown fields from
    /// stream producers survive a round trip instead of being dropped.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Transaction {
    /// Look up a named field, checking the typed columns first and the
    /// `extra` side-channel second. Used by rule evaluators, which address
    /// transaction fields by name.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "amount" => Some(serde_json::Value::from(self.amount.to_string())),
            "time_since_last_transaction" => self.time_since_last_transaction.map(Into::into),
            "spending_deviation_score" => self.spending_deviation_score.map(Into::into),
            "velocity_score" => self.velocity_score.map(Into::into),
            "geo_anomaly_score" => self.geo_anomaly_score.map(Into::into),
            "location" => self.location.clone().map(serde_json::Value::String),
            "merchant_category" => self.merchant_category.clone().map(serde_json::Value::String),
            "payment_channel" => self.payment_channel.clone().map(serde_json::Value::String),
            "sender_account" => Some(serde_json::Value::String(self.sender_account.clone())),
            "receiver_account" => Some(serde_json::Value::String(self.receiver_account.clone())),
            "device_used" => self
                .device_used
                .and_then(|d| serde_json::to_value(d).ok()),
            "transaction_type" => self
                .transaction_type
                .and_then(|t| serde_json::to_value(t).ok()),
            _ => self.extra.get(name).cloned(),
        }
    }
}

/// Rule criticality. `Unset` (level 0) is distinct from `Low` and only
/// occurs for malformed or legacy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Unset,
    Low,
    Medium,
    High,
    Critical,
}

impl Criticality {
    pub fn level(self) -> u8 {
        match self {
            Self::Unset => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Default for Criticality {
    fn default() -> Self {
        Self::Unset
    }
}

/// Comparison operator used by threshold rules and composite leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn apply_f64(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Self::Ne => (lhs - rhs).abs() >= f64::EPSILON,
        }
    }

    pub fn apply_str(self, lhs: &str, rhs: &str) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            // Ordering operators on strings fall back to lexicographic comparison.
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

/// Boolean logic connective for composite rule internal nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
    Not,
}

/// A composite rule's condition tree: either a leaf comparison or an
/// internal boolean node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tree {
    Leaf {
        column: String,
        operator: Operator,
        value: serde_json::Value,
    },
    Node {
        logic: Logic,
        conditions: Vec<Tree>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub column_name: String,
    pub operator: Operator,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRule {
    pub rule: Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    Sender,
    Receiver,
    Pair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub window_seconds: i64,
    pub min_count: u32,
    pub total_amount_limit: Option<f64>,
    /// Despite the name, this is compared as a ceiling on the single
    /// largest transaction amount in the window, not a floor. Preserved
    /// as-is per SPEC_FULL.md open-question decision #1 — renaming it
    /// would diverge from the stored/wire rule contract.
    pub min_amount_limit: Option<f64>,
    pub group_mode: GroupMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlRule {
    pub model_name: String,
    pub input_template: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleKind {
    Threshold(ThresholdRule),
    Composite(CompositeRule),
    Pattern(PatternRule),
    Ml(MlRule),
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Threshold(_) => "threshold",
            Self::Composite(_) => "composite",
            Self::Pattern(_) => "pattern",
            Self::Ml(_) => "ml",
        }
    }
}

/// A rule, one of four variants, common metadata plus kind-specific body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub criticality: Criticality,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// One fired rule's contribution to a transaction's evaluation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub id: i64,
    pub kind: &'static str,
    pub title: String,
    pub criticality: Criticality,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criticality_ordering_matches_spec() {
        assert!(Criticality::Unset.level() == 0);
        assert!(Criticality::Low < Criticality::Medium);
        assert!(Criticality::Medium < Criticality::High);
        assert!(Criticality::High < Criticality::Critical);
    }

    #[test]
    fn operator_round_trips_on_equal_operands() {
        for op in [Operator::Gt, Operator::Ge, Operator::Lt, Operator::Le, Operator::Eq, Operator::Ne] {
            let expected = match op {
                Operator::Ge | Operator::Le | Operator::Eq => true,
                Operator::Gt | Operator::Lt | Operator::Ne => false,
            };
            assert_eq!(op.apply_f64(5.0, 5.0), expected, "operator {:?}", op);
        }
    }
}
