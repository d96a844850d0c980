use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of an intent rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business category of a rule; selects the aggregation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Inventory,
    Production,
    Test,
    Exploration,
    Other,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Production => "production",
            Self::Test => "test",
            Self::Exploration => "exploration",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a scenario label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scenario: {0}")]
pub struct UnknownScenario(pub String);

impl FromStr for Scenario {
    type Err = UnknownScenario;

    /// Accepts the canonical names plus the category labels used by rule
    /// authors (库存, 上线/生产, 测试/检验, 探索, 其他).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inventory" | "库存" | "库存场景" => Ok(Self::Inventory),
            "production" | "online" | "生产" | "上线" | "上线场景" => Ok(Self::Production),
            "test" | "lab" | "inspection" | "测试" | "检验" | "测试场景" => Ok(Self::Test),
            "exploration" | "探索" => Ok(Self::Exploration),
            "other" | "general" | "其他" | "通用" => Ok(Self::Other),
            other => Err(UnknownScenario(other.to_string())),
        }
    }
}

/// Whether a rule takes part in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

/// How a parameter value is obtained from the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamKind {
    /// One of the rule's declared values.
    Enum,
    /// Longest dictionary entry contained in the query.
    #[serde(alias = "fuzzy_string", alias = "fuzzy")]
    FuzzyString,
    Date,
    Number,
    /// Hard-coded by the rule author; never read from the query.
    Fixed,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enum => "enum",
            Self::FuzzyString => "fuzzy-string",
            Self::Date => "date",
            Self::Number => "number",
            Self::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the extractor looks up candidate values for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    Supplier,
    Material,
    Factory,
    Project,
    Status,
    /// Structural batch-code pattern rather than a dictionary.
    Batch,
}

impl EntitySource {
    /// Infer the source from a parameter name such as `supplier_name` or
    /// `batch_code`.
    pub fn infer(param_name: &str) -> Option<Self> {
        let name = param_name.to_lowercase();
        if name.contains("supplier") || name.contains("vendor") {
            Some(Self::Supplier)
        } else if name.contains("material") {
            Some(Self::Material)
        } else if name.contains("factory") || name.contains("plant") {
            Some(Self::Factory)
        } else if name.contains("project") {
            Some(Self::Project)
        } else if name.contains("batch") || name.contains("lot") {
            Some(Self::Batch)
        } else if name.contains("status") {
            Some(Self::Status)
        } else {
            None
        }
    }
}

/// Direction a `number` parameter compares in. A question whose operator
/// contradicts the declared direction does not bind the parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = "=")]
    Eq,
}

impl Comparison {
    /// Map a question's comparison phrase (`超过`, `<=`, ...) to a direction.
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        Some(match phrase {
            ">=" | "大于等于" | "不低于" | "不少于" | "至少" => Self::Ge,
            "<=" | "小于等于" | "不超过" | "不高于" | "至多" => Self::Le,
            ">" | "大于" | "超过" | "高于" | "多于" => Self::Gt,
            "<" | "小于" | "低于" | "少于" => Self::Lt,
            "=" | "等于" => Self::Eq,
            _ => return None,
        })
    }

    /// Whether a question phrased as `asked` fits a parameter declared as
    /// `self`. Strict and inclusive bounds in the same direction are
    /// interchangeable.
    pub fn accepts(self, asked: Comparison) -> bool {
        match self {
            Self::Gt | Self::Ge => matches!(asked, Self::Gt | Self::Ge),
            Self::Lt | Self::Le => matches!(asked, Self::Lt | Self::Le),
            Self::Eq => asked == Self::Eq,
        }
    }
}

/// Declaration of one template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    /// Allowed values for `enum` parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Author-supplied value for `fixed` parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Lookup source for `fuzzy-string` parameters; inferred from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EntitySource>,
    /// Required direction for `number` parameters; any direction when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            required,
            values: Vec::new(),
            value: None,
            source: None,
            comparison: None,
        }
    }

    pub fn with_values(mut self, values: &[&str]) -> Self {
        self.values = values.iter().map(|v| (*v).to_string()).collect();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_source(mut self, source: EntitySource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    /// Explicit source, falling back to inference from the parameter name.
    pub fn entity_source(&self) -> Option<EntitySource> {
        self.source.or_else(|| EntitySource::infer(&self.name))
    }
}

/// A named, declarative mapping from trigger phrases to a parameterized
/// query template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scenario: Scenario,
    pub trigger_words: Vec<String>,
    /// Canonical term → equivalent surface forms.
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub parameter_specs: Vec<ParameterSpec>,
    pub template: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_query: Option<String>,
}

impl IntentRule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Look up a declared parameter by name.
    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameter_specs.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_serialization() {
        assert_eq!(
            serde_json::to_string(&Scenario::Inventory).unwrap(),
            r#""inventory""#
        );
        assert_eq!(
            serde_json::to_string(&Scenario::Exploration).unwrap(),
            r#""exploration""#
        );
    }

    #[test]
    fn scenario_from_author_labels() {
        assert_eq!("库存".parse::<Scenario>().unwrap(), Scenario::Inventory);
        assert_eq!("上线".parse::<Scenario>().unwrap(), Scenario::Production);
        assert_eq!(" Test ".parse::<Scenario>().unwrap(), Scenario::Test);
        assert!("weather".parse::<Scenario>().is_err());
    }

    #[test]
    fn param_kind_accepts_both_spellings() {
        let kebab: ParamKind = serde_json::from_str(r#""fuzzy-string""#).unwrap();
        let snake: ParamKind = serde_json::from_str(r#""fuzzy_string""#).unwrap();
        assert_eq!(kebab, ParamKind::FuzzyString);
        assert_eq!(snake, ParamKind::FuzzyString);
        assert_eq!(
            serde_json::to_string(&ParamKind::FuzzyString).unwrap(),
            r#""fuzzy-string""#
        );
    }

    #[test]
    fn entity_source_inference() {
        assert_eq!(EntitySource::infer("supplier"), Some(EntitySource::Supplier));
        assert_eq!(
            EntitySource::infer("material_code"),
            Some(EntitySource::Material)
        );
        assert_eq!(EntitySource::infer("batch_code"), Some(EntitySource::Batch));
        assert_eq!(EntitySource::infer("threshold"), None);
    }

    #[test]
    fn explicit_source_overrides_inference() {
        let spec = ParameterSpec::new("vendor", ParamKind::FuzzyString, true)
            .with_source(EntitySource::Factory);
        assert_eq!(spec.entity_source(), Some(EntitySource::Factory));
    }

    #[test]
    fn parameter_spec_defaults() {
        let json = r#"{"name": "status", "kind": "enum"}"#;
        let spec: ParameterSpec = serde_json::from_str(json).unwrap();
        assert!(!spec.required);
        assert!(spec.values.is_empty());
        assert!(spec.value.is_none());
        assert!(spec.comparison.is_none());
    }

    #[test]
    fn comparison_accepts_symbols_and_names() {
        let json = r#"{"name": "threshold", "kind": "number", "comparison": "<"}"#;
        let spec: ParameterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.comparison, Some(Comparison::Lt));

        let json = r#"{"name": "threshold", "kind": "number", "comparison": "ge"}"#;
        let spec: ParameterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.comparison, Some(Comparison::Ge));
    }

    #[test]
    fn comparison_direction_compatibility() {
        assert_eq!(Comparison::from_phrase("超过"), Some(Comparison::Gt));
        assert_eq!(Comparison::from_phrase("不超过"), Some(Comparison::Le));
        assert_eq!(Comparison::from_phrase("低于"), Some(Comparison::Lt));
        assert_eq!(Comparison::from_phrase("约"), None);

        assert!(Comparison::Gt.accepts(Comparison::Ge));
        assert!(Comparison::Le.accepts(Comparison::Lt));
        assert!(!Comparison::Gt.accepts(Comparison::Lt));
        assert!(!Comparison::Lt.accepts(Comparison::Gt));
        assert!(!Comparison::Eq.accepts(Comparison::Ge));
    }

    #[test]
    fn rule_status_default_is_active() {
        assert_eq!(RuleStatus::default(), RuleStatus::Active);
    }
}
