use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rule::Scenario;
use crate::value::{ExtractedValue, Row};

/// A free-text question submitted for resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    #[serde(alias = "query", alias = "query_text", alias = "question")]
    pub query_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ResolutionContext>,
}

impl ResolutionRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            context: None,
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.context = Some(ResolutionContext {
            scenario: Some(scenario),
        });
        self
    }

    /// Scenario restriction requested by the caller, if any.
    pub fn scenario_hint(&self) -> Option<Scenario> {
        self.context.as_ref().and_then(|c| c.scenario)
    }
}

/// Optional caller context (e.g. the dashboard tab the question came from).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionContext {
    /// Only rules of this scenario are considered when set.
    #[serde(default)]
    pub scenario: Option<Scenario>,
}

/// One headline statistic shown above the result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCard {
    /// Stable machine key (e.g. `ng_batches`).
    pub key: String,
    pub label: String,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl SummaryCard {
    pub fn new(key: impl Into<String>, label: impl Into<String>, value: u64) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            value,
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Outcome of resolving one question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    pub success: bool,
    /// Rule that produced the result (the fallback rule's name on fallback).
    pub matched_rule_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
    /// True when no rule matched and the fallback policy was applied.
    #[serde(default)]
    pub fallback: bool,
    pub table_data: Vec<Row>,
    pub summary_cards: Vec<SummaryCard>,
    pub narrative: String,
    pub row_count: usize,
    #[serde(default)]
    pub parameters: BTreeMap<String, ExtractedValue>,
    /// Parameters bound to a match-everything value because extraction found nothing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wildcards: Vec<String>,
}

impl ResolutionResponse {
    /// A user-visible failure: narrative only, empty table.
    pub fn failure(matched_rule_name: Option<String>, narrative: impl Into<String>) -> Self {
        Self {
            success: false,
            matched_rule_name,
            narrative: narrative.into(),
            ..Self::default()
        }
    }

    pub fn card(&self, key: &str) -> Option<&SummaryCard> {
        self.summary_cards.iter().find(|c| c.key == key)
    }
}
