//! Intent rules stored in `nlp_intent_rules`.

use async_trait::async_trait;
use sqlx::PgPool;

use iq_engine::{RuleRecord, RuleSource, SourceError, SourceResult};

/// Reads every row of `nlp_intent_rules` as JSON and hands it to the rule
/// normalizer, so column spelling and JSON-in-text quirks are handled there.
pub struct PgRuleSource {
    pool: PgPool,
}

impl PgRuleSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleSource for PgRuleSource {
    async fn load_rules(&self) -> SourceResult<Vec<RuleRecord>> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT to_jsonb(r) FROM nlp_intent_rules r ORDER BY r.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SourceError::Store(e.to_string()))?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| SourceError::Parse(e.to_string())))
            .collect()
    }

    fn name(&self) -> &str {
        "postgres:nlp_intent_rules"
    }
}
