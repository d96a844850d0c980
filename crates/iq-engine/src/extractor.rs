//! Entity extraction: typed parameter values recognized in query text.
//!
//! One data-driven pass per rule: each declared `ParameterSpec` says how its
//! value is found: a dictionary, the declared value set, a structural pattern,
//! or the author's fixed value. Only declared parameters are ever produced.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use iq_protocol::{
    Comparison, EntitySource, ExtractedValue, IntentRule, ParamKind, ParamValue, ParameterSpec,
};

use crate::dictionary::Dictionaries;

static RE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*[-/年.]\s*(\d{1,2})\s*[-/月.]\s*(\d{1,2})\s*日?").unwrap()
});

static RE_BATCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z0-9]{6,}").unwrap());

// Longer operators first: alternation is leftmost-first.
static RE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(>=|<=|>|<|=|大于等于|小于等于|不低于|不少于|至少|不超过|不高于|至多|大于|超过|高于|多于|小于|低于|少于|等于)\s*(\d+(?:\.\d+)?)\s*%?",
    )
    .unwrap()
});

/// Parameters extracted for one query. Keys are always declared by the
/// winning rule's `parameter_specs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractedParameters(BTreeMap<String, ExtractedValue>);

impl ExtractedParameters {
    /// Build from explicit values (tests and callers replaying a resolution).
    pub fn from_values<K: Into<String>>(
        values: impl IntoIterator<Item = (K, ExtractedValue)>,
    ) -> Self {
        Self(values.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtractedValue)> {
        self.0.iter()
    }

    pub fn into_map(self) -> BTreeMap<String, ExtractedValue> {
        self.0
    }
}

/// Stateless extractor; dictionaries are passed per call so they can be
/// refreshed independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every parameter the rule declares that can be found in `text`.
    pub fn extract(
        &self,
        text: &str,
        rule: &IntentRule,
        dictionaries: &Dictionaries,
    ) -> ExtractedParameters {
        let mut values = BTreeMap::new();
        for spec in &rule.parameter_specs {
            let found = match spec.kind {
                ParamKind::FuzzyString => extract_entity(text, spec, dictionaries),
                ParamKind::Enum => extract_enum(text, spec, rule),
                ParamKind::Date => extract_date(text),
                ParamKind::Number => extract_number(text, spec.comparison),
                ParamKind::Fixed => spec.value.as_ref().map(|v| ExtractedValue {
                    raw_text: v.clone(),
                    normalized_value: ParamValue::Text(v.clone()),
                    kind: ParamKind::Fixed,
                }),
            };
            match found {
                Some(value) => {
                    values.insert(spec.name.clone(), value);
                }
                None => tracing::trace!(rule = %rule.name, param = %spec.name, "not extracted"),
            }
        }
        ExtractedParameters(values)
    }
}

fn extract_entity(
    text: &str,
    spec: &ParameterSpec,
    dictionaries: &Dictionaries,
) -> Option<ExtractedValue> {
    let source = spec.entity_source()?;
    let found = match source {
        EntitySource::Batch => find_batch_code(text).map(String::from),
        other => longest_entry(text, dictionaries.entries(other)).map(String::from),
    }?;
    Some(ExtractedValue {
        raw_text: found.clone(),
        normalized_value: ParamValue::Text(found),
        kind: ParamKind::FuzzyString,
    })
}

fn extract_enum(text: &str, spec: &ParameterSpec, rule: &IntentRule) -> Option<ExtractedValue> {
    let lower = text.to_lowercase();

    // (canonical value, surface form) with the longest surface form winning.
    let mut best: Option<(&str, &str)> = None;
    for value in &spec.values {
        let forms = std::iter::once(value.as_str())
            .chain(rule.synonyms.get(value).into_iter().flatten().map(String::as_str));
        for form in forms {
            if form.is_empty() || !lower.contains(&form.to_lowercase()) {
                continue;
            }
            if best.is_none_or(|(_, f)| form.chars().count() > f.chars().count()) {
                best = Some((value, form));
            }
        }
    }

    best.map(|(value, form)| ExtractedValue {
        raw_text: form.to_string(),
        normalized_value: ParamValue::Text(value.to_string()),
        kind: ParamKind::Enum,
    })
}

fn extract_date(text: &str) -> Option<ExtractedValue> {
    RE_DATE.captures_iter(text).find_map(|caps| {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(ExtractedValue {
            raw_text: caps[0].trim().to_string(),
            normalized_value: ParamValue::Date(date),
            kind: ParamKind::Date,
        })
    })
}

/// First comparison in `text` whose direction fits `declared`.
fn extract_number(text: &str, declared: Option<Comparison>) -> Option<ExtractedValue> {
    RE_NUMBER.captures_iter(text).find_map(|caps| {
        let asked = Comparison::from_phrase(&caps[1])?;
        if declared.is_some_and(|d| !d.accepts(asked)) {
            tracing::debug!(?declared, ?asked, raw = &caps[0], "comparison direction mismatch");
            return None;
        }
        let value: f64 = caps[2].parse().ok()?;
        Some(ExtractedValue {
            raw_text: caps[0].trim().to_string(),
            normalized_value: ParamValue::Number(value),
            kind: ParamKind::Number,
        })
    })
}

/// Direction of an extracted number's raw text, such as `超过3%`.
pub fn comparison_of(raw: &str) -> Option<Comparison> {
    let caps = RE_NUMBER.captures(raw)?;
    Comparison::from_phrase(&caps[1])
}

/// Longest entry contained in `text` (case-insensitive). Equal lengths keep
/// the earliest entry.
pub fn longest_entry<'a>(text: &str, entries: &'a [String]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    let mut best: Option<&'a str> = None;
    for entry in entries {
        if entry.is_empty() || !lower.contains(&entry.to_lowercase()) {
            continue;
        }
        if best.is_none_or(|b| entry.chars().count() > b.chars().count()) {
            best = Some(entry);
        }
    }
    best
}

/// First batch-code-shaped token (`[A-Z0-9]{6,}`).
pub fn find_batch_code(text: &str) -> Option<&str> {
    RE_BATCH.find(text).map(|m| m.as_str())
}
