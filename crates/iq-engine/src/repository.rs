//! Rule repository: validated, immutable rule sets behind a hot-swappable
//! handle.
//!
//! A `RuleSet` is built once from raw records and never mutated. Refreshing
//! builds a new set and swaps it in; resolutions already holding the old
//! `Arc<RuleSet>` finish against it.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use iq_protocol::{IntentRule, ParamKind, RuleId};

use crate::error::{MalformedReason, MalformedRule, SourceResult, TemplateError};
use crate::matcher::RuleSignals;
use crate::record::RuleRecord;
use crate::source::RuleSource;
use crate::template::Template;

/// A validated rule with its parsed template and precomputed match signals.
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: IntentRule,
    pub template: Template,
    pub signals: RuleSignals,
    /// Position in the source; the final tie-breaker between equal matches.
    pub ordinal: usize,
}

impl CompiledRule {
    fn compile(rule: IntentRule, ordinal: usize) -> Result<Self, MalformedRule> {
        let fail = |reason: MalformedReason| MalformedRule::new(rule.name.clone(), reason);

        if rule.is_active() && rule.trigger_words.iter().all(|t| t.trim().is_empty()) {
            return Err(fail(MalformedReason::NoTriggerWords));
        }

        let mut seen = HashSet::new();
        for spec in &rule.parameter_specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(fail(MalformedReason::DuplicateParameter(spec.name.clone())));
            }
            if spec.kind == ParamKind::Fixed && spec.value.as_deref().is_none_or(str::is_empty) {
                return Err(fail(MalformedReason::FixedWithoutValue(spec.name.clone())));
            }
            if spec.kind == ParamKind::Enum && spec.values.iter().all(|v| v.trim().is_empty()) {
                return Err(fail(MalformedReason::EnumWithoutValues(spec.name.clone())));
            }
        }

        let template = Template::parse(&rule.template).map_err(|e| fail(e.into()))?;
        for name in template.placeholders() {
            if rule.spec(name).is_none() {
                return Err(fail(TemplateError::UndeclaredParameter(name.to_string()).into()));
            }
        }
        if let Some(spec) = rule
            .parameter_specs
            .iter()
            .find(|s| s.required && !template.references(&s.name))
        {
            return Err(fail(MalformedReason::UnreferencedRequired(spec.name.clone())));
        }

        let signals = RuleSignals::compile(&rule);
        Ok(Self {
            rule,
            template,
            signals,
            ordinal,
        })
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }
}

/// A rule excluded at load time, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub rule: String,
    pub reason: String,
}

impl From<&MalformedRule> for Rejection {
    fn from(err: &MalformedRule) -> Self {
        Self {
            rule: err.rule.clone(),
            reason: err.reason.to_string(),
        }
    }
}

/// Outcome of one load or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub source: String,
    /// Rules that passed validation, active or not.
    pub loaded: usize,
    pub active: usize,
    pub rejected: Vec<Rejection>,
}

/// An immutable, validated set of rules.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Arc<CompiledRule>>,
    /// Active rules ordered by priority desc, then load order.
    active: Vec<Arc<CompiledRule>>,
    rejected: Vec<MalformedRule>,
}

impl RuleSet {
    /// Validate and compile every record. Malformed records are kept out of
    /// the set and reported; they never abort the load.
    pub fn build(records: Vec<RuleRecord>) -> Self {
        let mut rules: Vec<Arc<CompiledRule>> = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        let mut names = HashSet::new();
        let mut ids: HashSet<RuleId> = HashSet::new();

        for (ordinal, record) in records.iter().enumerate() {
            let compiled = record.normalize(ordinal).and_then(|rule| {
                if names.contains(&rule.name) {
                    return Err(MalformedRule::new(&rule.name, MalformedReason::DuplicateName));
                }
                if ids.contains(&rule.id) {
                    return Err(MalformedRule::new(
                        &rule.name,
                        MalformedReason::DuplicateId(rule.id.to_string()),
                    ));
                }
                CompiledRule::compile(rule, ordinal)
            });

            match compiled {
                Ok(rule) => {
                    names.insert(rule.rule.name.clone());
                    ids.insert(rule.rule.id.clone());
                    rules.push(Arc::new(rule));
                }
                Err(err) => {
                    tracing::warn!(rule = %err.rule, reason = %err.reason, "rule rejected");
                    rejected.push(err);
                }
            }
        }

        let mut active: Vec<Arc<CompiledRule>> =
            rules.iter().filter(|r| r.rule.is_active()).cloned().collect();
        active.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });

        Self {
            rules,
            active,
            rejected,
        }
    }

    /// Active rules, highest priority first.
    pub fn active(&self) -> &[Arc<CompiledRule>] {
        &self.active
    }

    /// Highest-priority active rule declaring no parameters; the default
    /// fallback for unmatched questions.
    pub fn catch_all(&self) -> Option<&Arc<CompiledRule>> {
        self.active
            .iter()
            .find(|r| r.rule.parameter_specs.is_empty())
    }

    /// All valid rules in load order, including inactive ones.
    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn lookup(&self, id: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.rule.id.as_str() == id)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.rule.name == name)
    }

    pub fn rejected(&self) -> &[MalformedRule] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn report(&self, source: &str) -> LoadReport {
        LoadReport {
            source: source.to_string(),
            loaded: self.rules.len(),
            active: self.active.len(),
            rejected: self.rejected.iter().map(Rejection::from).collect(),
        }
    }
}

/// Holds the current rule set and reloads it from a `RuleSource`.
pub struct RuleRepository {
    source: Arc<dyn RuleSource>,
    current: RwLock<Arc<RuleSet>>,
}

impl RuleRepository {
    /// Repository with an empty set; call `load` before serving.
    pub fn new(source: Arc<dyn RuleSource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(RuleSet::default())),
        }
    }

    /// Create and perform the initial load.
    pub async fn load(source: Arc<dyn RuleSource>) -> SourceResult<(Self, LoadReport)> {
        let repo = Self::new(source);
        let report = repo.refresh().await?;
        Ok((repo, report))
    }

    /// Rebuild the rule set from the source and swap it in. If the source
    /// cannot be read, the previous set stays active and the error is returned.
    pub async fn refresh(&self) -> SourceResult<LoadReport> {
        let records = match self.source.load_rules().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(source = self.source.name(), error = %e, "rule refresh failed, keeping previous set");
                return Err(e);
            }
        };

        Ok(self.install(records))
    }

    /// Repository seeded with `records` without reading the source; later
    /// refreshes read from `source` as usual.
    pub fn preloaded(source: Arc<dyn RuleSource>, records: Vec<RuleRecord>) -> (Self, LoadReport) {
        let repo = Self::new(source);
        let report = repo.install(records);
        (repo, report)
    }

    fn install(&self, records: Vec<RuleRecord>) -> LoadReport {
        let set = Arc::new(RuleSet::build(records));
        let report = set.report(self.source.name());
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = set;

        tracing::info!(
            source = %report.source,
            loaded = report.loaded,
            active = report.active,
            rejected = report.rejected.len(),
            "rule set loaded"
        );
        report
    }

    /// The current set. Stays valid across later refreshes.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_rules(&self) -> Vec<Arc<CompiledRule>> {
        self.snapshot().active().to_vec()
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<CompiledRule>> {
        self.snapshot().lookup(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<CompiledRule>> {
        self.snapshot().rules().to_vec()
    }

    pub fn rejected(&self) -> Vec<MalformedRule> {
        self.snapshot().rejected().to_vec()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }
}
