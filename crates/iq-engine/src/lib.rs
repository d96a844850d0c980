//! Intent query resolution engine.
//!
//! Turns a free-text question about inventory, production-line or lab-test
//! records into a bound, parameterized query and a summarized result:
//!
//! text → `Matcher` (rules from `RuleRepository`) → `EntityExtractor`
//! → `Template` instantiation → `QueryExecutor` → `Aggregator`.
//!
//! `Resolver` wires the stages together; `mock` provides in-memory rule
//! sources and stores for tests and development.

pub mod aggregator;
pub mod dictionary;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod matcher;
pub mod mock;
pub mod record;
pub mod repository;
pub mod resolver;
pub mod source;
pub mod template;

// Re-export key types for convenience
pub use aggregator::{Aggregation, Aggregator, AggregatorConfig, ColumnAliases};
pub use dictionary::{Dictionaries, DictionarySource, DictionaryStore, StaticDictionarySource};
pub use error::{
    ExecutionError, MalformedReason, MalformedRule, ResolutionError, SourceError, SourceResult,
    TemplateError,
};
pub use executor::{QueryExecutor, QueryResult, ResultStatus};
pub use extractor::{EntityExtractor, ExtractedParameters};
pub use matcher::{MatchResult, Matcher};
pub use mock::{MockRuleSource, MockStore, sample_dictionaries, sample_rules};
pub use record::RuleRecord;
pub use repository::{CompiledRule, LoadReport, Rejection, RuleRepository, RuleSet};
pub use resolver::{Candidate, Explanation, Resolver, ResolverConfig};
pub use source::{FileDictionarySource, FileRuleSource, RuleSource};
pub use template::{BoundQuery, BoundValue, Template};
