//! Error types for rule loading, template binding, and query execution.

use thiserror::Error;

/// Why a rule record was rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("rule name is empty")]
    EmptyName,

    #[error("duplicate rule name")]
    DuplicateName,

    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),

    #[error("active rule has no trigger words")]
    NoTriggerWords,

    #[error("template is empty")]
    EmptyTemplate,

    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("required parameter '{0}' is not referenced by the template")]
    UnreferencedRequired(String),

    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    #[error("fixed parameter '{0}' has no value")]
    FixedWithoutValue(String),

    #[error("enum parameter '{0}' declares no values")]
    EnumWithoutValues(String),

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("invalid field '{field}': {message}")]
    InvalidField { field: &'static str, message: String },
}

/// A rule that failed validation and was excluded from the active set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed rule '{rule}': {reason}")]
pub struct MalformedRule {
    /// Rule name, or a positional label when the name itself is missing.
    pub rule: String,
    pub reason: MalformedReason,
}

impl MalformedRule {
    pub fn new(rule: impl Into<String>, reason: impl Into<MalformedReason>) -> Self {
        Self {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// Authoring errors in a query template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("placeholder '{{{0}}}' is not a declared parameter")]
    UndeclaredParameter(String),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),

    #[error("invalid placeholder name '{0}'")]
    InvalidName(String),

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedBrace(usize),

    #[error("placeholder '{{{0}}}' appears inside a quoted literal and cannot be bound")]
    QuotedPlaceholder(String),

    #[error("raw positional parameter '{0}' is not allowed; use named placeholders")]
    RawPositional(String),
}

/// Classified failure of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Deterministic rejection (bad SQL, unknown column, decode failure). Never retried.
    #[error("query rejected by the store: {0}")]
    Syntax(String),

    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("query timed out after {0} ms")]
    Timeout(u64),
}

impl ExecutionError {
    /// Connectivity and timeout failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "syntax",
            Self::Connectivity(_) => "connectivity",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Errors from rule and dictionary sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("source not found: {0}")]
    NotFound(String),
}

/// Convenience alias for source results.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failures of one resolution pass, mapped to a user-facing narrative.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no rule matched the query")]
    NoRuleMatched,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl ResolutionError {
    /// Narrative shown to end users. Never includes SQL, values, or credentials.
    pub fn user_message(&self, rule_name: &str) -> String {
        match self {
            Self::NoRuleMatched => {
                "No rule matched the question and no fallback rule is available; no query was run."
                    .to_string()
            }
            Self::Template(_) => format!(
                "The rule '{rule_name}' is misconfigured and could not prepare a query. \
                 It has been reported to the rule authors."
            ),
            Self::Execution(ExecutionError::Syntax(_)) => format!(
                "The query for '{rule_name}' was rejected by the data store. \
                 It has been reported for investigation."
            ),
            Self::Execution(_) => {
                "The data service is temporarily unavailable; please try again shortly."
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_rule_display() {
        let err = MalformedRule::new(
            "批次库存查询",
            TemplateError::UndeclaredParameter("batch".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("批次库存查询"));
        assert!(msg.contains("{batch}"));
    }

    #[test]
    fn retryable_classification() {
        assert!(!ExecutionError::Syntax("column does not exist".into()).is_retryable());
        assert!(ExecutionError::Connectivity("refused".into()).is_retryable());
        assert!(ExecutionError::Timeout(500).is_retryable());
    }

    #[test]
    fn user_message_hides_details() {
        let err = ResolutionError::Execution(ExecutionError::Connectivity(
            "postgres://admin:secret@db:5432".into(),
        ));
        let msg = err.user_message("供应商库存查询");
        assert!(msg.contains("temporarily unavailable"));
        assert!(!msg.contains("secret"));

        let err = ResolutionError::Execution(ExecutionError::Syntax(
            "SELECT * FROM nope".into(),
        ));
        assert!(!err.user_message("x").contains("SELECT"));
    }
}
