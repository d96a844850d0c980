//! Rule listing and refresh endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use iq_engine::{CompiledRule, LoadReport, Rejection};
use iq_protocol::{IntentRule, ParamKind, RuleStatus, Scenario};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Rule overview for listings; the full record is served per rule.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    pub id: String,
    pub name: String,
    pub scenario: Scenario,
    pub status: RuleStatus,
    pub priority: i32,
    pub trigger_words: Vec<String>,
    pub parameters: Vec<ParameterSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl From<&CompiledRule> for RuleSummary {
    fn from(compiled: &CompiledRule) -> Self {
        let rule = &compiled.rule;
        Self {
            id: rule.id.to_string(),
            name: rule.name.clone(),
            scenario: rule.scenario,
            status: rule.status,
            priority: rule.priority,
            trigger_words: rule.trigger_words.clone(),
            parameters: rule
                .parameter_specs
                .iter()
                .map(|s| ParameterSummary {
                    name: s.name.clone(),
                    kind: s.kind,
                    required: s.required,
                })
                .collect(),
            example_query: rule.example_query.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RuleListing {
    pub rules: Vec<RuleSummary>,
    pub rejected: Vec<Rejection>,
}

/// GET /api/v1/rules: all valid rules in load order, plus the last load's rejects.
pub async fn list_rules(State(state): State<AppState>) -> Json<RuleListing> {
    let set = state.rules().snapshot();
    Json(RuleListing {
        rules: set.rules().iter().map(|r| RuleSummary::from(r.as_ref())).collect(),
        rejected: set.rejected().iter().map(Rejection::from).collect(),
    })
}

/// GET /api/v1/rules/{id}: one rule by id, or by name.
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IntentRule>> {
    let set = state.rules().snapshot();
    let compiled = set
        .lookup(&id)
        .or_else(|| set.lookup_by_name(&id))
        .ok_or_else(|| ApiError::NotFound(format!("rule '{id}' not found")))?;
    Ok(Json(compiled.rule.clone()))
}

/// POST /api/v1/rules/refresh: reload rules; the previous set stays on failure.
pub async fn refresh_rules(State(state): State<AppState>) -> ApiResult<Json<LoadReport>> {
    let report = state.rules().refresh().await?;
    Ok(Json(report))
}
