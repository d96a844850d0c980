//! Raw rule records as authored or stored, normalized into `IntentRule`.
//!
//! Stored rules are inconsistent: `action_target` vs `template`,
//! `trigger_words` as a JSON array, a JSON-encoded string, or a delimited
//! string. Every shape is coerced here; anything that cannot be coerced is a
//! `MalformedRule`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Value, json};

use iq_protocol::{IntentRule, ParamKind, ParameterSpec, RuleId, RuleStatus, Scenario};

use crate::error::{MalformedReason, MalformedRule};

/// A rule record before normalization. Field names accept the snake_case,
/// camelCase and legacy spellings found in stored rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "intent_name", alias = "intentName")]
    pub name: Value,
    #[serde(default)]
    pub description: Value,
    #[serde(default, alias = "category")]
    pub scenario: Value,
    #[serde(default, alias = "triggerWords", alias = "keywords")]
    pub trigger_words: Value,
    #[serde(default)]
    pub synonyms: Value,
    #[serde(default)]
    pub patterns: Value,
    #[serde(default, alias = "parameterSpecs", alias = "parameters")]
    pub parameter_specs: Value,
    #[serde(
        default,
        alias = "action_target",
        alias = "actionTarget",
        alias = "sql_template"
    )]
    pub template: Value,
    #[serde(default)]
    pub priority: Value,
    #[serde(default)]
    pub status: Value,
    #[serde(default, alias = "exampleQuery")]
    pub example_query: Value,
}

impl RuleRecord {
    /// Record form of an already-typed rule.
    pub fn from_rule(rule: &IntentRule) -> Self {
        Self {
            id: json!(rule.id),
            name: json!(rule.name),
            description: json!(rule.description),
            scenario: json!(rule.scenario),
            trigger_words: json!(rule.trigger_words),
            synonyms: json!(rule.synonyms),
            patterns: json!(rule.patterns),
            parameter_specs: json!(rule.parameter_specs),
            template: json!(rule.template),
            priority: json!(rule.priority),
            status: json!(rule.status),
            example_query: json!(rule.example_query),
        }
    }

    /// Name for error reports; falls back to a positional label.
    pub fn label(&self, ordinal: usize) -> String {
        text(&self.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("#{}", ordinal + 1))
    }

    /// Coerce into the typed rule. Shape problems only; cross-field template
    /// validation happens in the repository.
    pub fn normalize(&self, ordinal: usize) -> Result<IntentRule, MalformedRule> {
        let label = self.label(ordinal);
        let fail = |reason: MalformedReason| MalformedRule::new(label.clone(), reason);

        let name = text(&self.name).unwrap_or_default();
        if name.is_empty() {
            return Err(fail(MalformedReason::EmptyName));
        }

        let id = match &self.id {
            Value::Number(n) => n.to_string(),
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => format!("rule-{}", ordinal + 1),
        };

        let scenario = match text(&self.scenario) {
            None => Scenario::Other,
            Some(s) if s.is_empty() => Scenario::Other,
            Some(s) => s
                .parse()
                .map_err(|_| fail(MalformedReason::UnknownScenario(s)))?,
        };

        let template = text(&self.template).unwrap_or_default();
        if template.is_empty() {
            return Err(fail(MalformedReason::EmptyTemplate));
        }

        Ok(IntentRule {
            id: RuleId::new(id),
            name,
            description: text(&self.description).unwrap_or_default(),
            scenario,
            trigger_words: string_list(&self.trigger_words).map_err(|m| {
                fail(MalformedReason::InvalidField {
                    field: "trigger_words",
                    message: m,
                })
            })?,
            synonyms: synonyms(&self.synonyms).map_err(|m| {
                fail(MalformedReason::InvalidField {
                    field: "synonyms",
                    message: m,
                })
            })?,
            patterns: string_list(&self.patterns).map_err(|m| {
                fail(MalformedReason::InvalidField {
                    field: "patterns",
                    message: m,
                })
            })?,
            parameter_specs: parameter_specs(&self.parameter_specs).map_err(|m| {
                fail(MalformedReason::InvalidField {
                    field: "parameter_specs",
                    message: m,
                })
            })?,
            template,
            priority: priority(&self.priority).map_err(|m| {
                fail(MalformedReason::InvalidField {
                    field: "priority",
                    message: m,
                })
            })?,
            status: status(&self.status),
            example_query: text(&self.example_query).filter(|q| !q.is_empty()),
        })
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A string that holds JSON (`'["a","b"]'`) is decoded first.
fn decode_embedded(value: &Value) -> Value {
    if let Value::String(s) = value {
        let trimmed = s.trim();
        if (trimmed.starts_with('[') || trimmed.starts_with('{'))
            && let Ok(decoded) = serde_json::from_str::<Value>(trimmed)
        {
            return decoded;
        }
    }
    value.clone()
}

fn string_list(value: &Value) -> Result<Vec<String>, String> {
    let items: Vec<String> = match decode_embedded(value) {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(|v| text(v).ok_or_else(|| format!("expected string, found {v}")))
            .collect::<Result<_, _>>()?,
        Value::String(s) => s
            .split([',', '，', '、', ';', '；', '\n'])
            .map(|p| p.trim().to_string())
            .collect(),
        other => return Err(format!("expected list, found {other}")),
    };
    Ok(items.into_iter().filter(|s| !s.is_empty()).collect())
}

fn synonyms(value: &Value) -> Result<BTreeMap<String, Vec<String>>, String> {
    match decode_embedded(value) {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.trim().to_string(), string_list(v)?)))
            .collect(),
        other => Err(format!("expected object, found {other}")),
    }
}

/// Accepts an array of spec objects, or an object keyed by parameter name
/// whose values are either a kind string or a spec object without `name`.
fn parameter_specs(value: &Value) -> Result<Vec<ParameterSpec>, String> {
    match decode_embedded(value) {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| e.to_string()))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(name, spec)| match spec {
                Value::String(kind) => {
                    let kind: ParamKind = serde_json::from_value(Value::String(kind))
                        .map_err(|e| format!("parameter '{name}': {e}"))?;
                    Ok(ParameterSpec::new(name, kind, false))
                }
                Value::Object(mut fields) => {
                    fields.insert("name".into(), Value::String(name.clone()));
                    serde_json::from_value(Value::Object(fields))
                        .map_err(|e| format!("parameter '{name}': {e}"))
                }
                other => Err(format!("parameter '{name}': unexpected {other}")),
            })
            .collect(),
        other => Err(format!("expected list, found {other}")),
    }
}

fn priority(value: &Value) -> Result<i32, String> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| format!("not an integer: {n}")),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s.trim().parse().map_err(|_| format!("not an integer: {s}")),
        other => Err(format!("not an integer: {other}")),
    }
}

fn status(value: &Value) -> RuleStatus {
    let active = match value {
        Value::Null => true,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "active" | "enabled" | "1" | "true" | "启用"
        ),
        _ => false,
    };
    if active {
        RuleStatus::Active
    } else {
        RuleStatus::Inactive
    }
}
