//! Resolution pipeline: Match → Extract → Instantiate → Execute → Aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use iq_protocol::{ExtractedValue, ResolutionRequest, ResolutionResponse, Row, RuleId, Scenario};

use crate::aggregator::{Aggregator, AggregatorConfig};
use crate::dictionary::DictionaryStore;
use crate::error::{ExecutionError, ResolutionError};
use crate::executor::{QueryExecutor, QueryResult, ResultStatus};
use crate::extractor::EntityExtractor;
use crate::matcher::{Matcher, normalize_query};
use crate::repository::{CompiledRule, RuleRepository, RuleSet};
use crate::template::BoundQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Lowest score that counts as a match.
    pub min_score: u32,
    /// Answer unmatched questions with a fallback rule. When false, an
    /// unmatched question gets an empty, explained response.
    pub fallback_enabled: bool,
    /// Fallback rule by name. `None` uses the rule set's catch-all rule.
    pub fallback_rule: Option<String>,
    pub query_timeout_ms: u64,
    /// Extra attempts after a connectivity failure or timeout.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Rows returned in `tableData`; `rowCount` still reports the full count.
    pub max_table_rows: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_score: 1,
            fallback_enabled: true,
            fallback_rule: None,
            query_timeout_ms: 10_000,
            max_retries: 1,
            retry_backoff_ms: 200,
            max_table_rows: 500,
        }
    }
}

/// One scored candidate, as reported by `explain`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub scenario: Scenario,
    pub score: u32,
    pub priority: i32,
    pub matched_triggers: Vec<String>,
    pub matched_patterns: Vec<String>,
    pub name_matched: bool,
}

/// Dry run of a resolution: everything up to, but not including, execution.
/// Bound values are absent; only parameter names are listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub query_text: String,
    pub normalized_query: String,
    pub candidates: Vec<Candidate>,
    pub selected_rule: Option<String>,
    pub fallback: bool,
    pub parameters: BTreeMap<String, ExtractedValue>,
    pub sql: Option<String>,
    pub param_names: Vec<String>,
    pub wildcards: Vec<String>,
    pub template_error: Option<String>,
}

/// The selected rule and whether it came from the fallback setting.
struct Selection {
    rule: Arc<CompiledRule>,
    fallback: bool,
}

pub struct Resolver {
    rules: Arc<RuleRepository>,
    dictionaries: Arc<DictionaryStore>,
    executor: Arc<dyn QueryExecutor>,
    matcher: Matcher,
    extractor: EntityExtractor,
    aggregator: Aggregator,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        rules: Arc<RuleRepository>,
        dictionaries: Arc<DictionaryStore>,
        executor: Arc<dyn QueryExecutor>,
        config: ResolverConfig,
        aggregator_config: AggregatorConfig,
    ) -> Self {
        Self {
            rules,
            dictionaries,
            executor,
            matcher: Matcher::new(config.min_score),
            extractor: EntityExtractor::new(),
            aggregator: Aggregator::new(aggregator_config),
            config,
        }
    }

    pub fn rules(&self) -> &Arc<RuleRepository> {
        &self.rules
    }

    pub fn dictionaries(&self) -> &Arc<DictionaryStore> {
        &self.dictionaries
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve one question. Never fails: every error becomes a response with
    /// `success = false`, empty `tableData` and an explanatory narrative.
    pub async fn resolve(&self, request: &ResolutionRequest) -> ResolutionResponse {
        let text = request.query_text.as_str();
        let rules = self.rules.snapshot();

        let Some(selection) = self.select(text, &rules, request.scenario_hint()) else {
            tracing::info!(query_len = text.chars().count(), "no rule matched");
            return ResolutionResponse::failure(
                None,
                ResolutionError::NoRuleMatched.user_message(""),
            );
        };

        let compiled = selection.rule;
        let rule = &compiled.rule;
        let dictionaries = self.dictionaries.snapshot();
        let params = self.extractor.extract(text, rule, &dictionaries);

        let bound = match compiled.template.instantiate(rule, &params) {
            Ok(bound) => bound,
            Err(e) => {
                tracing::error!(rule = %rule.name, error = %e, "template instantiation failed");
                let mut response = ResolutionResponse::failure(
                    Some(rule.name.clone()),
                    ResolutionError::from(e).user_message(&rule.name),
                );
                response.fallback = selection.fallback;
                return response;
            }
        };
        tracing::debug!(rule = %rule.name, sql = %bound.sql, params = ?bound.param_names, "query bound");

        let rows = match self.execute_with_retry(&bound, &rule.name).await {
            Ok(rows) => rows,
            Err(e) => {
                let mut response = ResolutionResponse::failure(
                    Some(rule.name.clone()),
                    ResolutionError::from(e).user_message(&rule.name),
                );
                response.scenario = Some(rule.scenario);
                response.fallback = selection.fallback;
                return response;
            }
        };

        let mut result = QueryResult::new(rows, rule.scenario);
        let aggregation = self.aggregator.aggregate(&rule.name, &result);
        result.truncate(self.config.max_table_rows);

        tracing::info!(
            rule = %rule.name,
            scenario = %rule.scenario,
            rows = result.row_count,
            fallback = selection.fallback,
            wildcards = bound.wildcards.len(),
            "query resolved"
        );

        let body = match result.status() {
            ResultStatus::Rows => aggregation.narrative,
            ResultStatus::Empty => empty_narrative(&rule.name, &bound.wildcards),
        };
        let narrative = if selection.fallback {
            format!(
                "No rule matched the question; showing results from the fallback rule '{}'. {body}",
                rule.name
            )
        } else {
            body
        };

        ResolutionResponse {
            success: true,
            matched_rule_name: Some(rule.name.clone()),
            scenario: Some(rule.scenario),
            fallback: selection.fallback,
            row_count: result.row_count,
            table_data: result.rows,
            summary_cards: aggregation.summary_cards,
            narrative,
            parameters: params.into_map(),
            wildcards: bound.wildcards,
        }
    }

    /// Everything `resolve` would do, without touching the store.
    pub fn explain(&self, request: &ResolutionRequest) -> Explanation {
        let text = request.query_text.as_str();
        let rules = self.rules.snapshot();
        let hint = request.scenario_hint();

        let candidates = self
            .matcher
            .rank(text, rules.active())
            .into_iter()
            .filter(|m| m.score > 0 && hint.is_none_or(|s| m.rule.rule.scenario == s))
            .map(|m| Candidate {
                rule_id: m.rule.rule.id.clone(),
                rule_name: m.rule.rule.name.clone(),
                scenario: m.rule.rule.scenario,
                score: m.score,
                priority: m.rule.rule.priority,
                matched_triggers: m.matched_triggers,
                matched_patterns: m.matched_patterns,
                name_matched: m.name_matched,
            })
            .collect();

        let mut explanation = Explanation {
            query_text: request.query_text.clone(),
            normalized_query: normalize_query(text),
            candidates,
            selected_rule: None,
            fallback: false,
            parameters: BTreeMap::new(),
            sql: None,
            param_names: Vec::new(),
            wildcards: Vec::new(),
            template_error: None,
        };

        let Some(selection) = self.select(text, &rules, hint) else {
            return explanation;
        };

        let rule = &selection.rule.rule;
        let params = self
            .extractor
            .extract(text, rule, &self.dictionaries.snapshot());
        match selection.rule.template.instantiate(rule, &params) {
            Ok(BoundQuery {
                sql,
                param_names,
                wildcards,
                ..
            }) => {
                explanation.sql = Some(sql);
                explanation.param_names = param_names;
                explanation.wildcards = wildcards;
            }
            Err(e) => explanation.template_error = Some(e.to_string()),
        }
        explanation.selected_rule = Some(rule.name.clone());
        explanation.fallback = selection.fallback;
        explanation.parameters = params.into_map();
        explanation
    }

    fn select(&self, text: &str, rules: &RuleSet, hint: Option<Scenario>) -> Option<Selection> {
        if let Some(best) = self.matcher.best(text, rules.active(), hint) {
            tracing::debug!(
                rule = %best.rule_name(),
                score = best.score,
                triggers = ?best.matched_triggers,
                "rule matched"
            );
            return Some(Selection {
                rule: best.rule,
                fallback: false,
            });
        }

        if !self.config.fallback_enabled {
            return None;
        }
        let rule = match self.config.fallback_rule.as_deref() {
            Some(name) => {
                let rule = rules.lookup_by_name(name);
                if rule.is_none() {
                    tracing::warn!(fallback_rule = %name, "configured fallback rule is not loaded");
                }
                rule
            }
            None => {
                let rule = rules.catch_all();
                if rule.is_none() {
                    tracing::warn!("no catch-all rule loaded, unmatched question left unanswered");
                }
                rule
            }
        }?;
        Some(Selection {
            rule: Arc::clone(rule),
            fallback: true,
        })
    }

    /// Linear backoff before retry `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    /// Run the query under the configured timeout, retrying connectivity
    /// failures and timeouts with linear backoff.
    async fn execute_with_retry(
        &self,
        query: &BoundQuery,
        rule_name: &str,
    ) -> Result<Vec<Row>, ExecutionError> {
        let timeout = Duration::from_millis(self.config.query_timeout_ms);
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(timeout, self.executor.execute(query)).await {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(self.config.query_timeout_ms)),
            };

            match outcome {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        rule = %rule_name,
                        backend = self.executor.backend_name(),
                        kind = e.kind(),
                        attempt,
                        "query failed, retrying"
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(e) => {
                    tracing::error!(
                        rule = %rule_name,
                        backend = self.executor.backend_name(),
                        kind = e.kind(),
                        error = %e,
                        "query failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Narrative for a query that ran cleanly but returned no rows.
fn empty_narrative(rule_name: &str, wildcards: &[String]) -> String {
    let mut narrative =
        format!("No records matched {rule_name}; the query ran successfully but returned nothing");
    if !wildcards.is_empty() {
        narrative.push_str(&format!(" (unconstrained: {})", wildcards.join(", ")));
    }
    narrative.push('.');
    narrative
}
