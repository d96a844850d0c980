//! Query execution abstraction: run a bound query against a backing store.

use async_trait::async_trait;
use serde::Serialize;

use iq_protocol::{Row, Scenario};

use crate::error::ExecutionError;
use crate::template::BoundQuery;

/// Runs bound queries. Implementations receive SQL with positional
/// placeholders and an ordered value list; they must bind, never splice.
///
/// Timeouts and cancellation are applied by the caller: dropping the
/// returned future must abandon the query.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &BoundQuery) -> Result<Vec<Row>, ExecutionError>;

    /// Backend label for logs.
    fn backend_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Rows,
    Empty,
}

/// Rows returned for a matched rule, tagged with the rule's scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub scenario: Scenario,
    /// Rows returned by the store, before any display truncation.
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>, scenario: Scenario) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            scenario,
            row_count,
        }
    }

    pub fn status(&self) -> ResultStatus {
        if self.row_count == 0 {
            ResultStatus::Empty
        } else {
            ResultStatus::Rows
        }
    }

    /// Keep at most `max` rows for display; `row_count` is unchanged.
    pub fn truncate(&mut self, max: usize) {
        self.rows.truncate(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(material: &str) -> Row {
        let mut r = Row::new();
        r.insert("material_code".into(), json!(material));
        r
    }

    #[test]
    fn empty_status() {
        let result = QueryResult::new(vec![], Scenario::Inventory);
        assert_eq!(result.status(), ResultStatus::Empty);
    }

    #[test]
    fn truncate_keeps_count() {
        let mut result = QueryResult::new(vec![row("M1"), row("M2"), row("M3")], Scenario::Test);
        result.truncate(2);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.status(), ResultStatus::Rows);
    }
}
