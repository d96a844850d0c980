//! Rule matching and scoring.
//!
//! Per rule: +1 for each trigger word (or synonym form) contained in the
//! normalized query, +2 when any pattern matches the raw query, +1 when the
//! rule name or one of its tokens appears. Highest score wins; ties go to
//! higher priority, then to the rule loaded first.

use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;

use iq_protocol::{IntentRule, Scenario};

use crate::repository::CompiledRule;

const TRIGGER_WEIGHT: u32 = 1;
const PATTERN_WEIGHT: u32 = 2;
const NAME_WEIGHT: u32 = 1;

/// Case-fold and strip whitespace, punctuation and the particle 的 so that
/// 供应商的库存 and 供应商库存 compare equal.
pub fn normalize_query(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation() && !is_cjk_filler(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_cjk_filler(c: char) -> bool {
    matches!(
        c,
        '的' | '，' | '。' | '？' | '！' | '、' | '：' | '；' | '“' | '”' | '‘' | '’' | '（' | '）'
            | '《' | '》' | '【' | '】' | '…'
    )
}

/// Precomputed match signals for one rule, built once per rule-set load.
#[derive(Debug, Clone)]
pub struct RuleSignals {
    /// (original trigger word, normalized surface forms)
    triggers: Vec<(String, Vec<String>)>,
    /// `None` for patterns that failed to compile; they never contribute.
    patterns: Vec<(String, Option<Regex>)>,
    name_forms: Vec<String>,
}

impl RuleSignals {
    pub fn compile(rule: &IntentRule) -> Self {
        let triggers = rule
            .trigger_words
            .iter()
            .map(|t| (t.clone(), trigger_forms(t, rule)))
            .collect();

        let patterns = rule
            .patterns
            .iter()
            .map(|p| match Regex::new(p) {
                Ok(re) => (p.clone(), Some(re)),
                Err(e) => {
                    tracing::warn!(
                        rule = %rule.name,
                        pattern = %p,
                        error = %e,
                        "invalid pattern ignored"
                    );
                    (p.clone(), None)
                }
            })
            .collect();

        Self {
            triggers,
            patterns,
            name_forms: name_forms(&rule.name),
        }
    }

    /// Number of patterns that failed to compile.
    pub fn invalid_patterns(&self) -> usize {
        self.patterns.iter().filter(|(_, re)| re.is_none()).count()
    }
}

/// The trigger itself, its declared synonyms, and variants where a canonical
/// term embedded in the trigger is replaced by each of its surface forms.
fn trigger_forms(trigger: &str, rule: &IntentRule) -> Vec<String> {
    let base = normalize_query(trigger);
    let mut forms = vec![base.clone()];

    if let Some(synonyms) = rule.synonyms.get(trigger) {
        forms.extend(synonyms.iter().map(|s| normalize_query(s)));
    }
    for (canonical, surfaces) in &rule.synonyms {
        let canonical = normalize_query(canonical);
        if canonical.is_empty() || canonical == base || !base.contains(&canonical) {
            continue;
        }
        for surface in surfaces {
            forms.push(base.replace(&canonical, &normalize_query(surface)));
        }
    }

    let mut seen = std::collections::HashSet::new();
    forms.retain(|f| !f.is_empty() && seen.insert(f.clone()));
    forms
}

fn name_forms(name: &str) -> Vec<String> {
    let mut forms = vec![normalize_query(name)];
    forms.extend(
        name.split(|c: char| {
            c.is_whitespace() || matches!(c, '_' | '-' | '/' | '|' | '·' | '、' | ',' | '，')
        })
        .map(normalize_query)
        .filter(|t| t.chars().count() >= 2),
    );
    forms.retain(|f| !f.is_empty());
    forms.dedup();
    forms
}

/// Score of one rule against one query.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub rule: Arc<CompiledRule>,
    pub score: u32,
    pub matched_triggers: Vec<String>,
    pub matched_patterns: Vec<String>,
    pub name_matched: bool,
}

impl MatchResult {
    pub fn rule_name(&self) -> &str {
        &self.rule.rule.name
    }

    /// Selection order: score desc, priority desc, load order asc.
    fn selection_order(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.rule.rule.priority.cmp(&self.rule.rule.priority))
            .then_with(|| self.rule.ordinal.cmp(&other.rule.ordinal))
    }
}

/// Deterministic scorer over a rule snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    min_score: u32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Matcher {
    /// `min_score` below 1 is raised to 1: a zero score never selects a rule.
    pub fn new(min_score: u32) -> Self {
        Self {
            min_score: min_score.max(1),
        }
    }

    pub fn min_score(&self) -> u32 {
        self.min_score
    }

    /// Score a single rule against raw query text.
    pub fn score(&self, text: &str, rule: &Arc<CompiledRule>) -> MatchResult {
        self.score_normalized(text, &normalize_query(text), rule)
    }

    fn score_normalized(&self, raw: &str, normalized: &str, rule: &Arc<CompiledRule>) -> MatchResult {
        let signals = &rule.signals;
        let mut score = 0;

        let matched_triggers: Vec<String> = signals
            .triggers
            .iter()
            .filter(|(_, forms)| forms.iter().any(|f| normalized.contains(f.as_str())))
            .map(|(trigger, _)| trigger.clone())
            .collect();
        score += TRIGGER_WEIGHT * matched_triggers.len() as u32;

        let matched_patterns: Vec<String> = signals
            .patterns
            .iter()
            .filter(|(_, re)| re.as_ref().is_some_and(|re| re.is_match(raw)))
            .map(|(p, _)| p.clone())
            .collect();
        if !matched_patterns.is_empty() {
            score += PATTERN_WEIGHT;
        }

        let name_matched = !normalized.is_empty()
            && signals
                .name_forms
                .iter()
                .any(|f| normalized.contains(f.as_str()));
        if name_matched {
            score += NAME_WEIGHT;
        }

        MatchResult {
            rule: rule.clone(),
            score,
            matched_triggers,
            matched_patterns,
            name_matched,
        }
    }

    /// All rules with their scores, in selection order.
    pub fn rank(&self, text: &str, rules: &[Arc<CompiledRule>]) -> Vec<MatchResult> {
        let normalized = normalize_query(text);
        let mut results: Vec<MatchResult> = rules
            .iter()
            .map(|r| self.score_normalized(text, &normalized, r))
            .collect();
        results.sort_by(MatchResult::selection_order);
        results
    }

    /// Best rule, optionally restricted to one scenario. `None` when the top
    /// score is below the threshold.
    pub fn best(
        &self,
        text: &str,
        rules: &[Arc<CompiledRule>],
        scenario: Option<Scenario>,
    ) -> Option<MatchResult> {
        let candidates: Vec<Arc<CompiledRule>> = rules
            .iter()
            .filter(|r| scenario.is_none_or(|s| r.rule.scenario == s))
            .cloned()
            .collect();
        let best = self.rank(text, &candidates).into_iter().next()?;
        if best.score < self.min_score {
            tracing::debug!(top_score = best.score, "no rule above threshold");
            return None;
        }
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::sample_rules;
    use crate::record::RuleRecord;
    use crate::repository::RuleSet;
    use iq_protocol::{ParamKind, ParameterSpec, RuleId, RuleStatus};

    fn simple_rule(name: &str, triggers: &[&str], priority: i32) -> IntentRule {
        IntentRule {
            id: RuleId::new(name),
            name: name.into(),
            description: String::new(),
            scenario: Scenario::Inventory,
            trigger_words: triggers.iter().map(|t| (*t).to_string()).collect(),
            synonyms: Default::default(),
            patterns: vec![],
            parameter_specs: vec![],
            template: "SELECT * FROM inventory".into(),
            priority,
            status: RuleStatus::Active,
            example_query: None,
        }
    }

    fn build(rules: Vec<IntentRule>) -> RuleSet {
        RuleSet::build(rules.iter().map(RuleRecord::from_rule).collect())
    }

    #[test]
    fn normalize_strips_particles_and_case() {
        assert_eq!(normalize_query("查询聚龙供应商的库存？"), "查询聚龙供应商库存");
        assert_eq!(normalize_query(" Show BOE Stock! "), "showboestock");
    }

    #[test]
    fn trigger_counts_once_per_word() {
        let set = build(vec![simple_rule("A", &["供应商库存", "库存"], 0)]);
        let m = Matcher::default().score("查询聚龙供应商的库存", &set.active()[0]);
        assert_eq!(m.score, 2);
        assert_eq!(m.matched_triggers, vec!["供应商库存", "库存"]);
    }

    #[test]
    fn synonyms_extend_trigger_forms() {
        let mut rule = simple_rule("A", &["供应商库存"], 0);
        rule.synonyms
            .insert("供应商".into(), vec!["厂商".into(), "供货商".into()]);
        let set = build(vec![rule]);
        let m = Matcher::default().score("看看厂商库存", &set.active()[0]);
        assert_eq!(m.matched_triggers, vec!["供应商库存"]);
    }

    #[test]
    fn direct_synonyms_of_trigger() {
        let mut rule = simple_rule("A", &["不良"], 0);
        rule.synonyms.insert("不良".into(), vec!["缺陷".into()]);
        let set = build(vec![rule]);
        assert_eq!(Matcher::default().score("缺陷多少", &set.active()[0]).score, 1);
    }

    #[test]
    fn pattern_adds_two_and_invalid_pattern_is_ignored() {
        let mut rule = simple_rule("A", &["库存"], 0);
        rule.patterns = vec!["(unclosed".into(), "供应商.*库存".into()];
        let set = build(vec![rule]);
        let compiled = &set.active()[0];
        assert_eq!(compiled.signals.invalid_patterns(), 1);

        let m = Matcher::default().score("聚龙供应商的库存", compiled);
        assert_eq!(m.score, 3);
        assert_eq!(m.matched_patterns, vec!["供应商.*库存"]);
    }

    #[test]
    fn rule_name_token_adds_one() {
        let set = build(vec![simple_rule("risk_inventory 风险库存", &["风险"], 0)]);
        let m = Matcher::default().score("风险库存有哪些", &set.active()[0]);
        assert!(m.name_matched);
        assert_eq!(m.score, 2);
    }

    #[test]
    fn zero_score_returns_none() {
        let set = build(sample_rules());
        assert!(Matcher::default().best("asdkjalksd", set.active(), None).is_none());
        assert!(Matcher::default().best("", set.active(), None).is_none());
    }

    #[test]
    fn higher_score_wins_over_priority() {
        let set = build(vec![
            simple_rule("broad", &["库存"], 100),
            simple_rule("narrow", &["库存", "风险"], 0),
        ]);
        let best = Matcher::default().best("风险库存", set.active(), None).unwrap();
        assert_eq!(best.rule_name(), "narrow");
    }

    #[test]
    fn ties_resolved_by_priority_then_load_order() {
        let set = build(vec![
            simple_rule("first", &["库存"], 0),
            simple_rule("second", &["库存"], 0),
            simple_rule("low", &["库存"], -1),
        ]);
        for _ in 0..20 {
            let best = Matcher::default().best("库存", set.active(), None).unwrap();
            assert_eq!(best.rule_name(), "first");
        }

        let set = build(vec![
            simple_rule("first", &["库存"], 0),
            simple_rule("urgent", &["库存"], 5),
        ]);
        let best = Matcher::default().best("库存", set.active(), None).unwrap();
        assert_eq!(best.rule_name(), "urgent");
    }

    #[test]
    fn scenario_restriction() {
        let mut test_rule = simple_rule("lab", &["记录"], 0);
        test_rule.scenario = Scenario::Test;
        let set = build(vec![simple_rule("inv", &["记录", "库存"], 0), test_rule]);

        let best = Matcher::default()
            .best("库存记录", set.active(), Some(Scenario::Test))
            .unwrap();
        assert_eq!(best.rule_name(), "lab");
    }

    #[test]
    fn min_score_threshold() {
        let set = build(vec![simple_rule("A", &["库存"], 0)]);
        assert!(Matcher::new(2).best("库存", set.active(), None).is_none());
        assert_eq!(Matcher::new(0).min_score(), 1);
    }

    #[test]
    fn sample_rules_resolve_expected_intents() {
        let set = build(sample_rules());
        let matcher = Matcher::default();
        let cases = [
            ("查询聚龙供应商的库存", "供应商库存查询"),
            ("目前有哪些风险库存？", "风险库存查询"),
            ("查询测试失败的记录", "测试记录查询"),
            ("上线不良率超过3%的项目", "上线不良率查询"),
            ("上线不良率低于3%的项目", "上线不良率低于查询"),
        ];
        for (query, expected) in cases {
            let best = matcher.best(query, set.active(), None).unwrap();
            assert_eq!(best.rule_name(), expected, "{query}");
        }
    }

    #[test]
    fn ranking_is_deterministic() {
        let set = build(sample_rules());
        let matcher = Matcher::default();
        let first: Vec<(String, u32)> = matcher
            .rank("聚龙的风险库存", set.active())
            .iter()
            .map(|m| (m.rule_name().to_string(), m.score))
            .collect();
        for _ in 0..10 {
            let again: Vec<(String, u32)> = matcher
                .rank("聚龙的风险库存", set.active())
                .iter()
                .map(|m| (m.rule_name().to_string(), m.score))
                .collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn extraction_does_not_affect_scoring() {
        let mut rule = simple_rule("A", &["库存"], 0);
        rule.parameter_specs = vec![ParameterSpec::new("supplier", ParamKind::FuzzyString, true)];
        rule.template = "SELECT * FROM inventory WHERE supplier_name LIKE {supplier}".into();
        let set = build(vec![rule]);
        assert_eq!(Matcher::default().score("库存", &set.active()[0]).score, 1);
    }
}
