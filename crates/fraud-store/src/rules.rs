//! Path: crates/fraud-store/src/rules.rs
//! The Rule Store: four families in four tables (`threshold_rules`,
//! `composite_rules`, `pattern_rules`, `ml_rules`), each carrying the
//! common `{id, title, description, is_active, criticality, created_at,
//! updated_at}` envelope (§3).
use crate::convert::{format_criticality, format_group_mode, parse_criticality, parse_group_mode, parse_operator};
use chrono::{DateTime, Utc};
use fraud_types::error::TransientInfrastructureError;
use fraud_types::model::{
    CompositeRule, MlRule, PatternRule, Rule, RuleKind, ThresholdRule, Tree,
};
use sqlx::{FromRow, PgPool};

fn infra_err(context: &str, e: sqlx::Error) -> TransientInfrastructureError {
    TransientInfrastructureError::Database(format!("{context}: {e}"))
}

#[derive(FromRow)]
struct ThresholdRow {
    id: i64,
    title: String,
    description: Option<String>,
    column_name: String,
    operator: String,
    value: f64,
    is_active: bool,
    criticality: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CompositeRow {
    id: i64,
    title: String,
    description: Option<String>,
    rule: serde_json::Value,
    is_active: bool,
    criticality: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PatternRow {
    id: i64,
    title: String,
    description: Option<String>,
    window_seconds: i32,
    min_count: i32,
    total_amount_limit: Option<f64>,
    min_amount_limit: Option<f64>,
    group_mode: String,
    is_active: bool,
    criticality: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MlRow {
    id: i64,
    title: String,
    description: Option<String>,
    model_name: String,
    input_template: String,
    threshold: f64,
    is_active: bool,
    criticality: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn threshold_rule(row: ThresholdRow) -> Result<Rule, TransientInfrastructureError> {
    let operator = parse_operator(&row.operator)
        .map_err(|e| TransientInfrastructureError::Database(e.to_string()))?;
    Ok(Rule {
        id: row.id,
        title: row.title,
        description: row.description,
        is_active: row.is_active,
        criticality: parse_criticality(&row.criticality),
        created_at: row.created_at,
        updated_at: row.updated_at,
        kind: RuleKind::Threshold(ThresholdRule {
            column_name: row.column_name,
            operator,
            value: row.value,
        }),
    })
}

fn composite_rule(row: CompositeRow) -> Result<Rule, TransientInfrastructureError> {
    let tree: Tree = serde_json::from_value(row.rule)
        .map_err(|e| TransientInfrastructureError::Database(format!("malformed composite rule {}: {e}", row.id)))?;
    Ok(Rule {
        id: row.id,
        title: row.title,
        description: row.description,
        is_active: row.is_active,
        criticality: parse_criticality(&row.criticality),
        created_at: row.created_at,
        updated_at: row.updated_at,
        kind: RuleKind::Composite(CompositeRule { rule: tree }),
    })
}

fn pattern_rule(row: PatternRow) -> Rule {
    Rule {
        id: row.id,
        title: row.title,
        description: row.description,
        is_active: row.is_active,
        criticality: parse_criticality(&row.criticality),
        created_at: row.created_at,
        updated_at: row.updated_at,
        kind: RuleKind::Pattern(PatternRule {
            window_seconds: row.window_seconds as i64,
            min_count: row.min_count.max(0) as u32,
            total_amount_limit: row.total_amount_limit,
            min_amount_limit: row.min_amount_limit,
            group_mode: parse_group_mode(&row.group_mode),
        }),
    }
}

fn ml_rule(row: MlRow) -> Rule {
    Rule {
        id: row.id,
        title: row.title,
        description: row.description,
        is_active: row.is_active,
        criticality: parse_criticality(&row.criticality),
        created_at: row.created_at,
        updated_at: row.updated_at,
        kind: RuleKind::Ml(MlRule {
            model_name: row.model_name,
            input_template: row.input_template,
            threshold: row.threshold,
        }),
    }
}

/// Loads every active rule across all four families, merged and sorted by
/// `(updated_at ascending, id ascending)` (§4.3.1). Malformed rows (e.g. a
/// composite rule whose JSON tree no longer deserialises) are logged and
/// skipped rather than failing the whole reload.
pub async fn load_active_snapshot(pool: &PgPool) -> Result<Vec<Rule>, TransientInfrastructureError> {
    let thresholds: Vec<ThresholdRow> = sqlx::query_as(
        "SELECT id, title, description, column_name, operator, value, is_active, criticality, created_at, updated_at \
         FROM threshold_rules WHERE is_active",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("load_active_snapshot/threshold", e))?;

    let composites: Vec<CompositeRow> = sqlx::query_as(
        "SELECT id, title, description, rule, is_active, criticality, created_at, updated_at \
         FROM composite_rules WHERE is_active",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("load_active_snapshot/composite", e))?;

    let patterns: Vec<PatternRow> = sqlx::query_as(
        "SELECT id, title, description, window_seconds, min_count, total_amount_limit, min_amount_limit, group_mode, \
                is_active, criticality, created_at, updated_at \
         FROM pattern_rules WHERE is_active",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("load_active_snapshot/pattern", e))?;

    let mls: Vec<MlRow> = sqlx::query_as(
        "SELECT id, title, description, model_name, input_template, threshold, is_active, criticality, created_at, updated_at \
         FROM ml_rules WHERE is_active",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("load_active_snapshot/ml", e))?;

    let mut merged = Vec::with_capacity(thresholds.len() + composites.len() + patterns.len() + mls.len());
    for row in thresholds {
        match threshold_rule(row) {
            Ok(r) => merged.push(r),
            Err(e) => tracing::warn!(event = "rule_load_skip", kind = "threshold", error = %e),
        }
    }
    for row in composites {
        match composite_rule(row) {
            Ok(r) => merged.push(r),
            Err(e) => tracing::warn!(event = "rule_load_skip", kind = "composite", error = %e),
        }
    }
    for row in patterns {
        merged.push(pattern_rule(row));
    }
    for row in mls {
        merged.push(ml_rule(row));
    }

    merged.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
    Ok(merged)
}

/// Restricts a process-wide snapshot to the subset visible at `batch_cutoff`
/// (§4.3.1: "a rule created mid-batch doesn't half-apply").
pub fn snapshot_as_of(rules: &[Rule], batch_cutoff: DateTime<Utc>) -> Vec<Rule> {
    rules
        .iter()
        .filter(|r| r.updated_at <= batch_cutoff)
        .cloned()
        .collect()
}

/// Lists every threshold rule, active or not, newest-updated first — the
/// admin listing behind `GET /api/rules/threshold/`.
pub async fn list_threshold(pool: &PgPool) -> Result<Vec<Rule>, TransientInfrastructureError> {
    let rows: Vec<ThresholdRow> = sqlx::query_as(
        "SELECT id, title, description, column_name, operator, value, is_active, criticality, created_at, updated_at \
         FROM threshold_rules ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("list_threshold", e))?;
    rows.into_iter().map(threshold_rule).collect()
}

/// Lists every composite rule, active or not.
pub async fn list_composite(pool: &PgPool) -> Result<Vec<Rule>, TransientInfrastructureError> {
    let rows: Vec<CompositeRow> = sqlx::query_as(
        "SELECT id, title, description, rule, is_active, criticality, created_at, updated_at \
         FROM composite_rules ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("list_composite", e))?;
    rows.into_iter().map(composite_rule).collect()
}

/// Lists every pattern rule, active or not.
pub async fn list_pattern(pool: &PgPool) -> Result<Vec<Rule>, TransientInfrastructureError> {
    let rows: Vec<PatternRow> = sqlx::query_as(
        "SELECT id, title, description, window_seconds, min_count, total_amount_limit, min_amount_limit, group_mode, \
                is_active, criticality, created_at, updated_at \
         FROM pattern_rules ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("list_pattern", e))?;
    Ok(rows.into_iter().map(pattern_rule).collect())
}

/// Lists every ML rule, active or not.
pub async fn list_ml(pool: &PgPool) -> Result<Vec<Rule>, TransientInfrastructureError> {
    let rows: Vec<MlRow> = sqlx::query_as(
        "SELECT id, title, description, model_name, input_template, threshold, is_active, criticality, created_at, updated_at \
         FROM ml_rules ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| infra_err("list_ml", e))?;
    Ok(rows.into_iter().map(ml_rule).collect())
}

/// Inserts a threshold rule, returning its assigned id.
pub async fn create_threshold(
    pool: &PgPool,
    title: &str,
    description: Option<&str>,
    rule: &ThresholdRule,
    criticality: fraud_types::model::Criticality,
    is_active: bool,
) -> Result<i64, TransientInfrastructureError> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO threshold_rules (title, description, column_name, operator, value, is_active, criticality, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now()) RETURNING id",
    )
    .bind(title)
    .bind(description)
    .bind(&rule.column_name)
    .bind(rule.operator.as_str())
    .bind(rule.value)
    .bind(is_active)
    .bind(format_criticality(criticality))
    .fetch_one(pool)
    .await
    .map_err(|e| infra_err("create_threshold", e))?;
    Ok(row.0)
}

/// Inserts a pattern rule, returning its assigned id.
pub async fn create_pattern(
    pool: &PgPool,
    title: &str,
    description: Option<&str>,
    rule: &PatternRule,
    criticality: fraud_types::model::Criticality,
    is_active: bool,
) -> Result<i64, TransientInfrastructureError> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO pattern_rules (title, description, window_seconds, min_count, total_amount_limit, min_amount_limit, \
                                     group_mode, is_active, criticality, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) RETURNING id",
    )
    .bind(title)
    .bind(description)
    .bind(rule.window_seconds as i32)
    .bind(rule.min_count as i32)
    .bind(rule.total_amount_limit)
    .bind(rule.min_amount_limit)
    .bind(format_group_mode(rule.group_mode))
    .bind(is_active)
    .bind(format_criticality(criticality))
    .fetch_one(pool)
    .await
    .map_err(|e| infra_err("create_pattern", e))?;
    Ok(row.0)
}

/// Inserts a composite rule, returning its assigned id.
pub async fn create_composite(
    pool: &PgPool,
    title: &str,
    description: Option<&str>,
    rule: &CompositeRule,
    criticality: fraud_types::model::Criticality,
    is_active: bool,
) -> Result<i64, TransientInfrastructureError> {
    let tree = serde_json::to_value(&rule.rule)
        .map_err(|e| TransientInfrastructureError::Database(format!("serializing composite rule: {e}")))?;
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO composite_rules (title, description, rule, is_active, criticality, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, now(), now()) RETURNING id",
    )
    .bind(title)
    .bind(description)
    .bind(tree)
    .bind(is_active)
    .bind(format_criticality(criticality))
    .fetch_one(pool)
    .await
    .map_err(|e| infra_err("create_composite", e))?;
    Ok(row.0)
}

/// Inserts an ML rule, returning its assigned id.
pub async fn create_ml(
    pool: &PgPool,
    title: &str,
    description: Option<&str>,
    rule: &MlRule,
    criticality: fraud_types::model::Criticality,
    is_active: bool,
) -> Result<i64, TransientInfrastructureError> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO ml_rules (title, description, model_name, input_template, threshold, is_active, criticality, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now()) RETURNING id",
    )
    .bind(title)
    .bind(description)
    .bind(&rule.model_name)
    .bind(&rule.input_template)
    .bind(rule.threshold)
    .bind(is_active)
    .bind(format_criticality(criticality))
    .fetch_one(pool)
    .await
    .map_err(|e| infra_err("create_ml", e))?;
    Ok(row.0)
}

/// The four rule-family tables, closed over so callers can never interpolate
/// arbitrary table names into a query.
#[derive(Debug, Clone, Copy)]
pub enum RuleFamily {
    Threshold,
    Composite,
    Pattern,
    Ml,
}

impl RuleFamily {
    fn table(self) -> &'static str {
        match self {
            Self::Threshold => "threshold_rules",
            Self::Composite => "composite_rules",
            Self::Pattern => "pattern_rules",
            Self::Ml => "ml_rules",
        }
    }
}

/// Flips `is_active` for a rule in the given family table. The caller is
/// responsible for publishing the "rules-reload" notification afterward
/// (§4.5) — this crate has no Redis dependency.
pub async fn set_active(
    pool: &PgPool,
    family: RuleFamily,
    id: i64,
    is_active: bool,
) -> Result<(), TransientInfrastructureError> {
    let sql = format!("UPDATE {} SET is_active = $1, updated_at = now() WHERE id = $2", family.table());
    sqlx::query(&sql)
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| infra_err("set_active", e))?;
    Ok(())
}

/// Deletes a rule from the given family table.
pub async fn delete(pool: &PgPool, family: RuleFamily, id: i64) -> Result<(), TransientInfrastructureError> {
    let sql = format!("DELETE FROM {} WHERE id = $1", family.table());
    sqlx::query(&sql)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| infra_err("delete", e))?;
    Ok(())
}
