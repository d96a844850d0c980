//! Scenario-specific summary statistics over query rows.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use iq_protocol::{Row, Scenario, SummaryCard};

use crate::executor::QueryResult;

/// Column names tried, in order, for each logical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub material: Vec<String>,
    pub batch: Vec<String>,
    pub supplier: Vec<String>,
    pub project: Vec<String>,
    pub status: Vec<String>,
    pub defect_rate: Vec<String>,
    pub test_result: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            material: names(&["material_code", "material_name", "material", "物料编码", "物料名称"]),
            batch: names(&["batch_code", "batch_no", "batch", "批次号"]),
            supplier: names(&["supplier_name", "supplier", "供应商"]),
            project: names(&["project", "project_name", "project_code", "项目"]),
            status: names(&["status", "inventory_status", "状态"]),
            defect_rate: names(&["defect_rate", "defect_rate_pct", "不良率"]),
            test_result: names(&["test_result", "result", "测试结果"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Defect-rate cutoff in percent; rates strictly above it are "over".
    pub defect_rate_cutoff: f64,
    pub risk_status: String,
    pub frozen_status: String,
    /// `test_result` values counted as failures (case-insensitive).
    pub failing_results: Vec<String>,
    pub columns: ColumnAliases,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            defect_rate_cutoff: 3.0,
            risk_status: "风险".into(),
            frozen_status: "冻结".into(),
            failing_results: names(&["NG", "FAIL", "不合格", "失败"]),
            columns: ColumnAliases::default(),
        }
    }
}

/// Summary cards and narrative for one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub summary_cards: Vec<SummaryCard>,
    pub narrative: String,
}

impl Aggregation {
    pub fn card(&self, key: &str) -> Option<&SummaryCard> {
        self.summary_cards.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Pure function of the rows: the same result always yields the same
    /// cards. Empty input yields zero counts.
    pub fn aggregate(&self, intent_name: &str, result: &QueryResult) -> Aggregation {
        let rows = &result.rows;
        let cols = &self.config.columns;
        let (summary_cards, fact) = match result.scenario {
            Scenario::Inventory => {
                let risk = self.count_status(rows, &self.config.risk_status);
                let frozen = self.count_status(rows, &self.config.frozen_status);
                let materials = distinct(rows, &cols.material);
                let suppliers = distinct(rows, &cols.supplier);
                let fact = if risk > 0 {
                    Some(format!("{risk} in {} status", self.config.risk_status))
                } else if frozen > 0 {
                    Some(format!("{frozen} in {} status", self.config.frozen_status))
                } else if materials > 0 {
                    Some(format!("{materials} materials from {suppliers} suppliers"))
                } else {
                    None
                };
                let cards = vec![
                    SummaryCard::new("materials", "Materials", materials).with_icon("package"),
                    SummaryCard::new("batches", "Batches", distinct(rows, &cols.batch))
                        .with_icon("layers"),
                    SummaryCard::new("suppliers", "Suppliers", suppliers).with_icon("truck"),
                    SummaryCard::new("risk", "Risk stock", risk).with_icon("alert-triangle"),
                    SummaryCard::new("frozen", "Frozen stock", frozen).with_icon("snowflake"),
                ];
                (cards, fact)
            }
            Scenario::Production => {
                let (within, over) = self.split_defect_rates(rows);
                let cutoff = self.config.defect_rate_cutoff;
                let fact = (over > 0)
                    .then(|| format!("{over} above the {cutoff}% defect-rate cutoff"));
                let cards = vec![
                    SummaryCard::new("materials", "Materials", distinct(rows, &cols.material))
                        .with_icon("package"),
                    SummaryCard::new("batches", "Batches", distinct(rows, &cols.batch))
                        .with_icon("layers"),
                    SummaryCard::new("projects", "Projects", distinct(rows, &cols.project))
                        .with_icon("folder"),
                    SummaryCard::new("suppliers", "Suppliers", distinct(rows, &cols.supplier))
                        .with_icon("truck"),
                    SummaryCard::new(
                        "within_threshold",
                        format!("Defect rate ≤ {cutoff}%"),
                        within,
                    )
                    .with_icon("check-circle"),
                    SummaryCard::new("over_threshold", format!("Defect rate > {cutoff}%"), over)
                        .with_icon("alert-circle"),
                ];
                (cards, fact)
            }
            Scenario::Test => {
                let ng = self.failing_batches(rows);
                let fact = (ng > 0).then(|| format!("{ng} batches with failing results"));
                let cards = vec![
                    SummaryCard::new("materials", "Materials", distinct(rows, &cols.material))
                        .with_icon("package"),
                    SummaryCard::new("batches", "Batches", distinct(rows, &cols.batch))
                        .with_icon("layers"),
                    SummaryCard::new("projects", "Projects", distinct(rows, &cols.project))
                        .with_icon("folder"),
                    SummaryCard::new("suppliers", "Suppliers", distinct(rows, &cols.supplier))
                        .with_icon("truck"),
                    SummaryCard::new("ng_batches", "Batches with NG results", ng)
                        .with_icon("x-circle"),
                ];
                (cards, fact)
            }
            Scenario::Exploration | Scenario::Other => (
                vec![SummaryCard::new("records", "Records", result.row_count as u64)],
                None,
            ),
        };

        let mut narrative = format!("Found {} records matching {intent_name}", result.row_count);
        if let Some(fact) = fact {
            narrative.push_str("; ");
            narrative.push_str(&fact);
        }
        narrative.push('.');

        Aggregation {
            summary_cards,
            narrative,
        }
    }

    fn count_status(&self, rows: &[Row], sentinel: &str) -> u64 {
        rows.iter()
            .filter(|row| field(row, &self.config.columns.status).as_deref() == Some(sentinel))
            .count() as u64
    }

    /// Rows within and over the cutoff. Unparseable rates count in neither.
    fn split_defect_rates(&self, rows: &[Row]) -> (u64, u64) {
        let cutoff = self.config.defect_rate_cutoff;
        rows.iter()
            .filter_map(|row| defect_rate(row, &self.config.columns.defect_rate))
            .fold((0, 0), |(within, over), rate| {
                if rate > cutoff {
                    (within, over + 1)
                } else {
                    (within + 1, over)
                }
            })
    }

    fn failing_batches(&self, rows: &[Row]) -> u64 {
        let cols = &self.config.columns;
        let failing: HashSet<String> = rows
            .iter()
            .filter(|row| {
                field(row, &cols.test_result).is_some_and(|r| {
                    self.config
                        .failing_results
                        .iter()
                        .any(|f| f.eq_ignore_ascii_case(&r))
                })
            })
            .filter_map(|row| field(row, &cols.batch))
            .collect();
        failing.len() as u64
    }
}

/// First non-empty value among the alias columns, as text.
fn field(row: &Row, aliases: &[String]) -> Option<String> {
    aliases.iter().find_map(|col| match row.get(col)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn distinct(rows: &[Row], aliases: &[String]) -> u64 {
    rows.iter()
        .filter_map(|row| field(row, aliases))
        .collect::<HashSet<_>>()
        .len() as u64
}

/// Defect rate as a percentage: `2.5`, `"2.5"` and `"2.5%"` all read as 2.5.
fn defect_rate(row: &Row, aliases: &[String]) -> Option<f64> {
    aliases.iter().find_map(|col| match row.get(col)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    })
}
