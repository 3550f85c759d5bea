//! Path: crates/fraud-store/src/convert.rs
//! String <-> enum conversions for columns stored as plain text, matching
//! `original_source/backend/transactions/models.py`'s choice fields.
use fraud_types::error::RuleEvaluationError;
use fraud_types::model::{Criticality, GroupMode, Operator};

pub fn parse_operator(s: &str) -> Result<Operator, RuleEvaluationError> {
    match s {
        ">" => Ok(Operator::Gt),
        ">=" => Ok(Operator::Ge),
        "<" => Ok(Operator::Lt),
        "<=" => Ok(Operator::Le),
        "==" => Ok(Operator::Eq),
        "!=" => Ok(Operator::Ne),
        other => Err(RuleEvaluationError::MalformedRule(format!(
            "unknown operator {other:?}"
        ))),
    }
}

pub fn format_criticality(c: Criticality) -> &'static str {
    c.as_str()
}

pub fn parse_criticality(s: &str) -> Criticality {
    match s {
        "low" => Criticality::Low,
        "medium" => Criticality::Medium,
        "high" => Criticality::High,
        "critical" => Criticality::Critical,
        _ => Criticality::Unset,
    }
}

pub fn format_group_mode(g: GroupMode) -> &'static str {
    match g {
        GroupMode::Sender => "sender",
        GroupMode::Receiver => "receiver",
        GroupMode::Pair => "pair",
    }
}

pub fn parse_group_mode(s: &str) -> GroupMode {
    match s {
        "receiver" => GroupMode::Receiver,
        "pair" => GroupMode::Pair,
        _ => GroupMode::Sender,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_round_trips_through_its_wire_string() {
        for (s, op) in [
            (">", Operator::Gt),
            (">=", Operator::Ge),
            ("<", Operator::Lt),
            ("<=", Operator::Le),
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
        ] {
            assert_eq!(parse_operator(s).unwrap(), op);
        }
    }

    #[test]
    fn unknown_operator_is_a_malformed_rule_error() {
        assert!(parse_operator("~=").is_err());
    }
}
