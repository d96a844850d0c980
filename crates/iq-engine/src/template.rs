//! Query templates with named `{placeholder}`s and positional binding.
//!
//! A template is parsed once at rule load. Instantiation turns every distinct
//! placeholder into a positional parameter (`$1`, `$2`, … in order of first
//! appearance) and returns the values separately, so user text never becomes
//! part of the SQL string.

use chrono::NaiveDate;
use serde::Serialize;

use iq_protocol::{IntentRule, ParamKind, ParamValue};

use crate::error::TemplateError;
use crate::extractor::ExtractedParameters;

/// Match-everything value for text parameters compared with `LIKE`.
pub const TEXT_WILDCARD: &str = "%";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Placeholder(String),
}

/// A parsed query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template.
    ///
    /// `{{` and `}}` produce literal braces anywhere. Inside single-quoted SQL
    /// literals a lone brace is ordinary text, but a well-formed `{name}` is
    /// rejected since it could only be filled by string interpolation.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut in_quote = false;
        let chars: Vec<(usize, char)> = source.char_indices().collect();
        let mut i = 0;

        while i < chars.len() {
            let (pos, c) = chars[i];
            match c {
                // Comments are copied verbatim; quotes and braces inside them
                // carry no meaning.
                '-' if !in_quote && next_is(&chars, i, '-') => {
                    let end = comment_end(&chars, i + 2, "\n");
                    text.extend(chars[i..end].iter().map(|(_, c)| *c));
                    i = end;
                }
                '/' if !in_quote && next_is(&chars, i, '*') => {
                    let end = comment_end(&chars, i + 2, "*/");
                    text.extend(chars[i..end].iter().map(|(_, c)| *c));
                    i = end;
                }
                '\'' => {
                    in_quote = !in_quote;
                    text.push(c);
                    i += 1;
                }
                '{' if next_is(&chars, i, '{') => {
                    text.push('{');
                    i += 2;
                }
                '{' if in_quote => {
                    if let Some((name, _)) = read_placeholder(&chars, i)
                        && is_identifier(&name)
                    {
                        return Err(TemplateError::QuotedPlaceholder(name));
                    }
                    text.push(c);
                    i += 1;
                }
                '{' => {
                    let (name, next) =
                        read_placeholder(&chars, i).ok_or(TemplateError::Unterminated(pos))?;
                    if !is_identifier(&name) {
                        return Err(TemplateError::InvalidName(name));
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Placeholder(name));
                    i = next;
                }
                '}' if next_is(&chars, i, '}') => {
                    text.push('}');
                    i += 2;
                }
                '}' if in_quote => {
                    text.push(c);
                    i += 1;
                }
                '}' => return Err(TemplateError::UnmatchedBrace(pos)),
                '$' if !in_quote && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit()) => {
                    let digits: String = chars[i + 1..]
                        .iter()
                        .map(|(_, d)| *d)
                        .take_while(char::is_ascii_digit)
                        .collect();
                    return Err(TemplateError::RawPositional(format!("${digits}")));
                }
                _ => {
                    text.push(c);
                    i += 1;
                }
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }

    pub fn references(&self, name: &str) -> bool {
        self.placeholders().contains(&name)
    }

    /// Bind extracted parameters into an executable query.
    ///
    /// Every placeholder is resolved: missing values become the kind's
    /// wildcard (`%` for text kinds, NULL for dates and numbers) and are
    /// listed in `BoundQuery::wildcards`. Fails only when a placeholder names
    /// a parameter the rule does not declare.
    pub fn instantiate(
        &self,
        rule: &IntentRule,
        params: &ExtractedParameters,
    ) -> Result<BoundQuery, TemplateError> {
        let names = self.placeholders();
        let mut bound = Vec::with_capacity(names.len());
        let mut wildcards = Vec::new();

        for name in &names {
            let spec = rule
                .spec(name)
                .ok_or_else(|| TemplateError::UndeclaredParameter((*name).to_string()))?;
            let value = match params.get(name) {
                Some(extracted) => BoundValue::from_param(spec.kind, &extracted.normalized_value),
                None => {
                    if spec.required {
                        tracing::debug!(
                            rule = %rule.name,
                            param = %name,
                            "required parameter missing, substituting wildcard"
                        );
                    }
                    wildcards.push((*name).to_string());
                    BoundValue::wildcard(spec.kind)
                }
            };
            bound.push(value);
        }

        let mut sql = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Placeholder(name) => {
                    // Position is 1-based and shared by repeated references.
                    let index = names
                        .iter()
                        .position(|n| *n == name.as_str())
                        .unwrap_or_default()
                        + 1;
                    sql.push('$');
                    sql.push_str(&index.to_string());
                }
            }
        }

        Ok(BoundQuery {
            sql,
            params: bound,
            param_names: names.into_iter().map(String::from).collect(),
            wildcards,
        })
    }
}

fn next_is(chars: &[(usize, char)], i: usize, expected: char) -> bool {
    chars.get(i + 1).is_some_and(|(_, c)| *c == expected)
}

/// Index just past the first `terminator` at or after `from`, or the end of
/// input when the comment is never closed.
fn comment_end(chars: &[(usize, char)], from: usize, terminator: &str) -> usize {
    let term: Vec<char> = terminator.chars().collect();
    (from..chars.len())
        .find(|&j| {
            chars[j..]
                .iter()
                .map(|(_, c)| *c)
                .take(term.len())
                .eq(term.iter().copied())
        })
        .map_or(chars.len(), |j| j + term.len())
}

/// Read `{name}` starting at the opening brace. Returns the name and the
/// index just past the closing brace.
fn read_placeholder(chars: &[(usize, char)], open: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    for (offset, (_, c)) in chars[open + 1..].iter().enumerate() {
        match c {
            '}' => return Some((name, open + offset + 2)),
            '{' | '\n' => return None,
            _ => name.push(*c),
        }
    }
    None
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escape `LIKE` metacharacters so user text only matches literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A value bound to one positional parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BoundValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Null,
}

impl BoundValue {
    fn from_param(kind: ParamKind, value: &ParamValue) -> Self {
        match (kind, value) {
            (ParamKind::FuzzyString, ParamValue::Text(s)) => {
                Self::Text(format!("%{}%", escape_like(s)))
            }
            (_, ParamValue::Text(s)) => Self::Text(s.clone()),
            (_, ParamValue::Number(n)) => Self::Number(*n),
            (_, ParamValue::Date(d)) => Self::Date(*d),
        }
    }

    /// Value substituted when a parameter could not be extracted.
    pub fn wildcard(kind: ParamKind) -> Self {
        match kind {
            ParamKind::FuzzyString | ParamKind::Enum => Self::Text(TEXT_WILDCARD.to_string()),
            ParamKind::Date | ParamKind::Number | ParamKind::Fixed => Self::Null,
        }
    }
}

/// An executable query: SQL with `$n` placeholders plus ordered values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<BoundValue>,
    /// Parameter name for each position in `params`.
    pub param_names: Vec<String>,
    /// Parameters bound to their wildcard.
    pub wildcards: Vec<String>,
}
