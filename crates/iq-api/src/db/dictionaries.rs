//! Entity dictionaries built from distinct values in the business tables.

use async_trait::async_trait;
use sqlx::PgPool;

use iq_engine::{Dictionaries, DictionarySource, SourceError, SourceResult};

const SUPPLIERS: &str = "SELECT DISTINCT supplier_name FROM inventory WHERE supplier_name IS NOT NULL AND supplier_name <> '' ORDER BY supplier_name";
const MATERIALS: &str = "SELECT DISTINCT material_name FROM inventory WHERE material_name IS NOT NULL AND material_name <> '' ORDER BY material_name";
const FACTORIES: &str = "SELECT DISTINCT factory FROM inventory WHERE factory IS NOT NULL AND factory <> '' ORDER BY factory";
const STATUSES: &str = "SELECT DISTINCT status FROM inventory WHERE status IS NOT NULL AND status <> '' ORDER BY status";
const PROJECTS: &str = "SELECT DISTINCT project FROM online_tracking WHERE project IS NOT NULL AND project <> '' ORDER BY project";

pub struct PgDictionarySource {
    pool: PgPool,
}

impl PgDictionarySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn distinct(&self, sql: &str) -> SourceResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::Store(e.to_string()))
    }
}

#[async_trait]
impl DictionarySource for PgDictionarySource {
    async fn load(&self) -> SourceResult<Dictionaries> {
        let (suppliers, materials, factories, statuses, projects) = tokio::try_join!(
            self.distinct(SUPPLIERS),
            self.distinct(MATERIALS),
            self.distinct(FACTORIES),
            self.distinct(STATUSES),
            self.distinct(PROJECTS),
        )?;
        Ok(Dictionaries {
            suppliers,
            materials,
            factories,
            statuses,
            projects,
        })
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
