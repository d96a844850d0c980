//! PostgreSQL adapters: rule source, dictionary source, query executor.

pub mod dictionaries;
pub mod executor;
pub mod rules;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use dictionaries::PgDictionarySource;
pub use executor::PgQueryExecutor;
pub use rules::PgRuleSource;

/// Connect to PostgreSQL and run migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    tracing::info!("running database migrations");
    sqlx::raw_sql(include_str!("../../migrations/001_intent_rules.sql"))
        .execute(&pool)
        .await?;
    tracing::info!("migrations complete");

    Ok(pool)
}
