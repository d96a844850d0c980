//! Shared application state for the Axum server.
//!
//! Supports two modes:
//! - **Database mode**: rules, dictionaries and queries go to PostgreSQL
//!   (a rule or dictionary file, when configured, replaces the table source).
//! - **In-memory mode**: sample rules (or a rule file) over `MockStore`
//!   sample tables, for tests and development.

use std::sync::Arc;

use sqlx::PgPool;

use iq_engine::{
    DictionarySource, DictionaryStore, FileDictionarySource, FileRuleSource, MockRuleSource,
    MockStore, QueryExecutor, Resolver, ResolverConfig, RuleRecord, RuleRepository, RuleSource,
    SourceResult, StaticDictionarySource, sample_dictionaries, sample_rules,
};

use crate::config::ApiConfig;
use crate::db;

/// Rule used for unmatched questions in sample mode.
pub const SAMPLE_FALLBACK_RULE: &str = "通用库存查询";

/// Shared application state, cheap to clone into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    /// PostgreSQL connection pool (None in in-memory mode).
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
            pool: None,
        }
    }

    pub fn rules(&self) -> &Arc<RuleRepository> {
        self.resolver.rules()
    }

    pub fn dictionaries(&self) -> &Arc<DictionaryStore> {
        self.resolver.dictionaries()
    }

    /// Create state backed by a PostgreSQL pool.
    pub async fn with_pool(pool: PgPool, config: &ApiConfig) -> SourceResult<Self> {
        let rule_source: Arc<dyn RuleSource> = match &config.rules_path {
            Some(path) => Arc::new(FileRuleSource::new(path)),
            None => Arc::new(db::PgRuleSource::new(pool.clone())),
        };
        let dictionary_source: Arc<dyn DictionarySource> = match &config.dictionaries_path {
            Some(path) => Arc::new(FileDictionarySource::new(path)),
            None => Arc::new(db::PgDictionarySource::new(pool.clone())),
        };
        let executor = Arc::new(db::PgQueryExecutor::new(pool.clone()));

        let mut state = Self::assemble(rule_source, dictionary_source, executor, config).await?;
        state.pool = Some(pool);
        Ok(state)
    }

    /// In-memory store with rules from `rules_path` or the built-in samples.
    pub async fn in_memory(config: &ApiConfig) -> SourceResult<Self> {
        let rule_source: Arc<dyn RuleSource> = match &config.rules_path {
            Some(path) => Arc::new(FileRuleSource::new(path)),
            None => Arc::new(MockRuleSource::with_sample_rules()),
        };
        let dictionary_source: Arc<dyn DictionarySource> = match &config.dictionaries_path {
            Some(path) => Arc::new(FileDictionarySource::new(path)),
            None => Arc::new(StaticDictionarySource(sample_dictionaries())),
        };
        let executor = Arc::new(MockStore::with_sample_data());
        Self::assemble(rule_source, dictionary_source, executor, config).await
    }

    /// Sample rules, dictionaries and tables with the sample fallback rule.
    pub fn with_sample_data() -> Self {
        let config = ResolverConfig {
            fallback_rule: Some(SAMPLE_FALLBACK_RULE.to_string()),
            ..Default::default()
        };
        Self::with_sample_store(Arc::new(MockStore::with_sample_data()), config)
    }

    /// Sample rules and dictionaries over a caller-provided executor.
    pub fn with_sample_store(executor: Arc<dyn QueryExecutor>, config: ResolverConfig) -> Self {
        let source = Arc::new(MockRuleSource::with_sample_rules());
        let records = sample_rules().iter().map(RuleRecord::from_rule).collect();
        let (rules, _) = RuleRepository::preloaded(source, records);
        let dictionaries = DictionaryStore::with_dictionaries(sample_dictionaries());
        Self::new(Resolver::new(
            Arc::new(rules),
            Arc::new(dictionaries),
            executor,
            config,
            Default::default(),
        ))
    }

    async fn assemble(
        rule_source: Arc<dyn RuleSource>,
        dictionary_source: Arc<dyn DictionarySource>,
        executor: Arc<dyn QueryExecutor>,
        config: &ApiConfig,
    ) -> SourceResult<Self> {
        let (rules, report) = RuleRepository::load(rule_source).await?;
        if !report.rejected.is_empty() {
            tracing::warn!(rejected = report.rejected.len(), "some rules were rejected at startup");
        }

        // Missing dictionaries degrade extraction but do not block startup.
        let dictionaries = DictionaryStore::new(dictionary_source);
        if let Err(e) = dictionaries.refresh().await {
            tracing::warn!(error = %e, "starting without entity dictionaries");
        }

        Ok(Self::new(Resolver::new(
            Arc::new(rules),
            Arc::new(dictionaries),
            executor,
            config.resolver.clone(),
            config.aggregator.clone(),
        )))
    }
}
