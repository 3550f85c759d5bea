//! Path: crates/fraud-ingest/src/rules_api.rs
//! Per-rule-family CRUD (§11 supplemented endpoints) and the rule
//! dry-run/test endpoint. Every create/activate/delete publishes on
//! `rules_reload` (§4.5) so the worker's cache invalidates promptly instead
//! of waiting out its TTL.
use crate::state::AppState;
use crate::AppError;
use axum::extract::{Path, State};
use axum::response::Json;
use fraud_store::rules::RuleFamily;
use fraud_types::model::{Criticality, CompositeRule, MlRule, PatternRule, Rule, RuleKind, ThresholdRule, Transaction};

fn infra(e: fraud_types::error::TransientInfrastructureError) -> AppError {
    AppError::Internal(anyhow::anyhow!(e))
}

async fn notify_reload(state: &AppState) -> Result<(), AppError> {
    let mut conn = state.redis.clone();
    fraud_stream::pubsub::publish_rules_reload(&mut conn).await.map_err(infra)
}

#[derive(serde::Deserialize)]
pub struct CreateBody<T> {
    pub title: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub rule: T,
    #[serde(default)]
    pub criticality: Criticality,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

macro_rules! rule_family_handlers {
    ($list:ident, $create:ident, $set_active:ident, $delete:ident, $store_list:path, $store_create:path, $family:expr, $rule_ty:ty) => {
        pub async fn $list(State(state): State<AppState>) -> Result<Json<Vec<Rule>>, AppError> {
            let rules = $store_list(&state.db).await.map_err(infra)?;
            Ok(Json(rules))
        }

        pub async fn $create(
            State(state): State<AppState>,
            Json(body): Json<CreateBody<$rule_ty>>,
        ) -> Result<Json<serde_json::Value>, AppError> {
            let id = $store_create(
                &state.db,
                &body.title,
                body.description.as_deref(),
                &body.rule,
                body.criticality,
                body.is_active,
            )
            .await
            .map_err(infra)?;
            notify_reload(&state).await?;
            Ok(Json(serde_json::json!({ "id": id })))
        }

        pub async fn $set_active(
            State(state): State<AppState>,
            Path(id): Path<i64>,
            Json(body): Json<SetActiveBody>,
        ) -> Result<Json<serde_json::Value>, AppError> {
            fraud_store::rules::set_active(&state.db, $family, id, body.is_active)
                .await
                .map_err(infra)?;
            notify_reload(&state).await?;
            Ok(Json(serde_json::json!({ "id": id, "is_active": body.is_active })))
        }

        pub async fn $delete(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<serde_json::Value>, AppError> {
            fraud_store::rules::delete(&state.db, $family, id).await.map_err(infra)?;
            notify_reload(&state).await?;
            Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
        }
    };
}

#[derive(serde::Deserialize)]
pub struct SetActiveBody {
    pub is_active: bool,
}

rule_family_handlers!(
    list_threshold,
    create_threshold,
    set_active_threshold,
    delete_threshold,
    fraud_store::rules::list_threshold,
    fraud_store::rules::create_threshold,
    RuleFamily::Threshold,
    ThresholdRule
);

rule_family_handlers!(
    list_composite,
    create_composite,
    set_active_composite,
    delete_composite,
    fraud_store::rules::list_composite,
    fraud_store::rules::create_composite,
    RuleFamily::Composite,
    CompositeRule
);

rule_family_handlers!(
    list_pattern,
    create_pattern,
    set_active_pattern,
    delete_pattern,
    fraud_store::rules::list_pattern,
    fraud_store::rules::create_pattern,
    RuleFamily::Pattern,
    PatternRule
);

rule_family_handlers!(
    list_ml,
    create_ml,
    set_active_ml,
    delete_ml,
    fraud_store::rules::list_ml,
    fraud_store::rules::create_ml,
    RuleFamily::Ml,
    MlRule
);

#[derive(serde::Deserialize)]
pub struct TestRuleBody {
    pub rule: RuleKind,
    pub transaction: Transaction,
    #[serde(default)]
    pub ml_probability: Option<f64>,
}

/// `POST /api/rules/<kind>/<id>/test/` (§11): evaluates a caller-supplied
/// rule against a caller-supplied fixture transaction without persisting
/// either, so operators can dry-run a rule edit before saving it. `<id>` is
/// accepted for routing symmetry with the other per-family endpoints but
/// unused — the rule body itself, not a stored id, is evaluated.
pub async fn test_rule(Path((_kind, _id)): Path<(String, i64)>, Json(body): Json<TestRuleBody>) -> Result<Json<serde_json::Value>, AppError> {
    let rule = Rule {
        id: 0,
        title: "test".to_string(),
        description: None,
        is_active: true,
        criticality: Criticality::Unset,
        created_at: body.transaction.timestamp,
        updated_at: body.transaction.timestamp,
        kind: body.rule,
    };
    let aggregates = fraud_rules::BatchAggregates::new();
    let outcome = fraud_rules::apply_rules(
        &body.transaction,
        std::slice::from_ref(&rule),
        &aggregates,
        body.ml_probability,
        fraud_types::config::StopMode::Never,
        Criticality::Critical.level(),
    );
    Ok(Json(serde_json::json!({
        "triggered": !outcome.triggered.is_empty(),
        "reasons": outcome.triggered.iter().map(|t| &t.reason).collect::<Vec<_>>(),
        "ml_outcomes": outcome.ml_outcomes.iter().map(|o| format!("{o:?}")).collect::<Vec<_>>(),
        "errors": outcome.errors.iter().map(|(_, e)| e.to_string()).collect::<Vec<_>>(),
    })))
}
