//! Bound-query execution against PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;

use iq_engine::{BoundQuery, BoundValue, ExecutionError, QueryExecutor};
use iq_protocol::Row;

type JsonRowQuery<'q> = QueryScalar<'q, sqlx::Postgres, serde_json::Value, PgArguments>;

/// Runs rule queries with positional binds. Each result row is converted to
/// a JSON object by the database, so arbitrary column sets need no decoding.
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Wrap the rule's statement so each row comes back as one JSON object.
pub fn wrap_as_json(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT to_jsonb(q) FROM ({inner}) AS q")
}

fn bind<'q>(query: JsonRowQuery<'q>, value: &BoundValue) -> JsonRowQuery<'q> {
    match value {
        BoundValue::Text(s) => query.bind(s.clone()),
        BoundValue::Number(n) => query.bind(*n),
        BoundValue::Date(d) => query.bind(*d),
        // Typed as text; templates cast nullable number and date placeholders.
        BoundValue::Null => query.bind(None::<String>),
    }
}

/// Map a driver error onto the retry classification.
pub fn classify(err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::Io(e) => ExecutionError::Connectivity(e.to_string()),
        sqlx::Error::Tls(e) => ExecutionError::Connectivity(e.to_string()),
        sqlx::Error::PoolTimedOut => ExecutionError::Connectivity("connection pool timed out".into()),
        sqlx::Error::PoolClosed => ExecutionError::Connectivity("connection pool closed".into()),
        sqlx::Error::WorkerCrashed => ExecutionError::Connectivity("connection worker crashed".into()),
        sqlx::Error::Database(db) => {
            // SQLSTATE class 08 is connection exception; 57P0x is server shutdown.
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            if code.starts_with("08") || code.starts_with("57P") {
                ExecutionError::Connectivity(db.message().to_string())
            } else {
                ExecutionError::Syntax(db.message().to_string())
            }
        }
        other => ExecutionError::Syntax(other.to_string()),
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, query: &BoundQuery) -> Result<Vec<Row>, ExecutionError> {
        let sql = wrap_as_json(&query.sql);
        let statement = query
            .params
            .iter()
            .fold(sqlx::query_scalar::<_, serde_json::Value>(&sql), bind);

        let rows = statement.fetch_all(&self.pool).await.map_err(classify)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
