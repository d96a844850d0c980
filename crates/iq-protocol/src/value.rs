use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::rule::ParamKind;

/// One result record: column name → value. Opaque until aggregated.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Normalized value of an extracted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// A parameter recognized in the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedValue {
    /// Surface text the value came from (the author's value for `fixed`).
    pub raw_text: String,
    pub normalized_value: ParamValue,
    pub kind: ParamKind,
}
