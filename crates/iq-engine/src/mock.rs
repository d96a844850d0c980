//! In-memory rule source and query store for tests and sample mode.
//!
//! `MockStore` keeps rows per table and honours the simple
//! `column <op> $n` filters the sample templates use, so resolutions against
//! it return realistically narrowed rows.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};

use iq_protocol::{
    Comparison, EntitySource, IntentRule, ParamKind, ParameterSpec, Row, RuleId, RuleStatus,
    Scenario,
};

use crate::dictionary::Dictionaries;
use crate::error::{ExecutionError, SourceError, SourceResult};
use crate::executor::QueryExecutor;
use crate::record::RuleRecord;
use crate::source::RuleSource;
use crate::template::{BoundQuery, BoundValue};

// ── Rule source ──

/// Serves a replaceable list of rule records.
pub struct MockRuleSource {
    records: Mutex<Vec<RuleRecord>>,
    failing: AtomicBool,
}

impl MockRuleSource {
    pub fn new(records: Vec<RuleRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failing: AtomicBool::new(false),
        }
    }

    /// Source serving `sample_rules()`.
    pub fn with_sample_rules() -> Self {
        Self::new(sample_rules().iter().map(RuleRecord::from_rule).collect())
    }

    /// Replace the records served by the next load.
    pub fn set_records(&self, records: Vec<RuleRecord>) {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records;
    }

    /// Make subsequent loads fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuleSource for MockRuleSource {
    async fn load_rules(&self) -> SourceResult<Vec<RuleRecord>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Store("mock rule source unavailable".into()));
        }
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ── Query store ──

static RE_FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+(\w+)").unwrap());

static RE_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\w+)(?:::\w+)?\s*(LIKE|>=|<=|=|>|<)\s*\$(\d+)").unwrap()
});

/// One `column <op> $n` condition found in the SQL.
struct Filter {
    column: String,
    op: String,
    index: usize,
}

impl Filter {
    /// A NULL binding passes, matching the `$n IS NULL OR …` guards in templates.
    fn matches(&self, row: &Row, params: &[BoundValue]) -> bool {
        let Some(bound) = self.index.checked_sub(1).and_then(|i| params.get(i)) else {
            return false;
        };
        let cell = row.get(&self.column);
        match bound {
            BoundValue::Null => true,
            BoundValue::Text(pattern) if self.op == "LIKE" => {
                cell_text(cell).is_some_and(|text| like(&text, pattern))
            }
            BoundValue::Text(expected) => cell_text(cell).as_deref() == Some(expected.as_str()),
            BoundValue::Number(n) => cell_number(cell).is_some_and(|v| compare(&self.op, v, *n)),
            BoundValue::Date(d) => {
                cell_text(cell).is_some_and(|text| compare(&self.op, text, d.to_string()))
            }
        }
    }
}

fn cell_text(cell: Option<&Value>) -> Option<String> {
    match cell? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn cell_number(cell: Option<&Value>) -> Option<f64> {
    match cell? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn compare<T: PartialOrd>(op: &str, left: T, right: T) -> bool {
    match op {
        ">" => left > right,
        ">=" => left >= right,
        "<" => left < right,
        "<=" => left <= right,
        _ => left == right,
    }
}

/// SQL `LIKE` with `\` escapes.
fn like(text: &str, pattern: &str) -> bool {
    let mut expr = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    expr.push_str(&regex::escape(&next.to_string()));
                }
            }
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).is_ok_and(|re| re.is_match(text))
}

/// In-memory store: rows per table, scripted failures, optional latency,
/// and a log of every query received.
#[derive(Default)]
pub struct MockStore {
    tables: HashMap<String, Vec<Row>>,
    failures: Mutex<VecDeque<ExecutionError>>,
    delay: Mutex<Option<Duration>>,
    queries: Mutex<Vec<BoundQuery>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: impl Into<String>, rows: Vec<Row>) {
        self.tables.insert(name.into().to_lowercase(), rows);
    }

    /// Store holding the sample inventory, production-line and lab-test tables.
    pub fn with_sample_data() -> Self {
        let mut store = Self::new();
        store.add_table("inventory", sample_inventory());
        store.add_table("online_tracking", sample_online_tracking());
        store.add_table("lab_tests", sample_lab_tests());
        store
    }

    /// Fail the next call with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, err: ExecutionError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// Delay every call by `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Every query received so far, in order.
    pub fn queries(&self) -> Vec<BoundQuery> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl QueryExecutor for MockStore {
    async fn execute(&self, query: &BoundQuery) -> Result<Vec<Row>, ExecutionError> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.clone());

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        let table = RE_FROM
            .captures(&query.sql)
            .map(|caps| caps[1].to_lowercase())
            .ok_or_else(|| ExecutionError::Syntax("missing FROM clause".into()))?;
        let rows = self
            .tables
            .get(&table)
            .ok_or_else(|| ExecutionError::Syntax(format!("relation \"{table}\" does not exist")))?;

        let filters: Vec<Filter> = RE_FILTER
            .captures_iter(&query.sql)
            .filter_map(|caps| {
                Some(Filter {
                    column: caps[1].to_string(),
                    op: caps[2].to_uppercase(),
                    index: caps[3].parse().ok()?,
                })
            })
            .collect();

        Ok(rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row, &query.params)))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}

// ── Sample data ──

fn rule(
    id: &str,
    name: &str,
    scenario: Scenario,
    triggers: &[&str],
    specs: Vec<ParameterSpec>,
    template: &str,
    priority: i32,
) -> IntentRule {
    IntentRule {
        id: RuleId::new(id),
        name: name.into(),
        description: String::new(),
        scenario,
        trigger_words: triggers.iter().map(|t| (*t).to_string()).collect(),
        synonyms: Default::default(),
        patterns: Vec::new(),
        parameter_specs: specs,
        template: template.into(),
        priority,
        status: RuleStatus::Active,
        example_query: None,
    }
}

const INVENTORY_COLUMNS: &str = "material_code, material_name, batch_code, supplier_name, factory, quantity, status, inbound_date";

/// A small rule set covering every scenario, plus one inactive rule.
pub fn sample_rules() -> Vec<IntentRule> {
    let mut general = rule(
        "inventory-general",
        "通用库存查询",
        Scenario::Inventory,
        &["库存"],
        vec![],
        &format!("SELECT {INVENTORY_COLUMNS} FROM inventory ORDER BY inbound_date DESC LIMIT 500"),
        0,
    );
    general.description = "All inventory, newest first".into();
    general.example_query = Some("查看库存".into());

    let mut supplier = rule(
        "inventory-supplier",
        "供应商库存查询",
        Scenario::Inventory,
        &["供应商库存", "供应商"],
        vec![ParameterSpec::new("supplier", ParamKind::FuzzyString, true)],
        &format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE supplier_name LIKE {{supplier}} ORDER BY inbound_date DESC LIMIT 500"
        ),
        10,
    );
    supplier
        .synonyms
        .insert("供应商".into(), vec!["厂商".into(), "供货商".into()]);
    supplier.patterns = vec!["供应商.*库存".into()];
    supplier.example_query = Some("查询聚龙供应商的库存".into());

    let mut risk = rule(
        "inventory-risk",
        "风险库存查询",
        Scenario::Inventory,
        &["风险库存", "风险"],
        vec![
            ParameterSpec::new("status", ParamKind::Fixed, true).with_value("风险"),
            ParameterSpec::new("supplier", ParamKind::FuzzyString, false),
        ],
        &format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE status = {{status}} AND supplier_name LIKE {{supplier}} ORDER BY inbound_date DESC LIMIT 500"
        ),
        20,
    );
    risk.example_query = Some("目前有哪些风险库存？".into());

    let frozen = rule(
        "inventory-frozen",
        "冻结库存查询",
        Scenario::Inventory,
        &["冻结库存", "冻结"],
        vec![
            ParameterSpec::new("status", ParamKind::Fixed, true).with_value("冻结"),
            ParameterSpec::new("factory", ParamKind::FuzzyString, false),
        ],
        &format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE status = {{status}} AND factory LIKE {{factory}} ORDER BY inbound_date DESC LIMIT 500"
        ),
        20,
    );

    let material = rule(
        "inventory-material",
        "物料库存查询",
        Scenario::Inventory,
        &["物料库存", "物料"],
        vec![ParameterSpec::new("material", ParamKind::FuzzyString, true)],
        &format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE material_name LIKE {{material}} ORDER BY inbound_date DESC LIMIT 500"
        ),
        5,
    );

    let batch = rule(
        "inventory-batch",
        "批次库存查询",
        Scenario::Inventory,
        &["批次"],
        vec![ParameterSpec::new("batch", ParamKind::FuzzyString, true).with_source(EntitySource::Batch)],
        &format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE batch_code LIKE {{batch}} ORDER BY inbound_date DESC LIMIT 500"
        ),
        5,
    );

    let mut online = rule(
        "production-defect-rate",
        "上线不良率查询",
        Scenario::Production,
        &["上线", "不良率", "生产"],
        vec![
            ParameterSpec::new("supplier", ParamKind::FuzzyString, false),
            ParameterSpec::new("project", ParamKind::FuzzyString, false),
            ParameterSpec::new("threshold", ParamKind::Number, false)
                .with_comparison(Comparison::Gt),
        ],
        "SELECT project, material_code, material_name, batch_code, supplier_name, factory, \
         defect_rate::float8 AS defect_rate, online_date FROM online_tracking \
         WHERE supplier_name LIKE {supplier} AND project LIKE {project} \
         AND ({threshold}::float8 IS NULL OR defect_rate::float8 > {threshold}::float8) \
         ORDER BY online_date DESC LIMIT 500",
        10,
    );
    online.patterns = vec!["不良率.*(超过|大于|高于|>)".into()];
    online.example_query = Some("上线不良率超过3%的项目".into());

    let mut online_below = rule(
        "production-defect-rate-below",
        "上线不良率低于查询",
        Scenario::Production,
        &["上线", "不良率", "生产"],
        vec![
            ParameterSpec::new("supplier", ParamKind::FuzzyString, false),
            ParameterSpec::new("project", ParamKind::FuzzyString, false),
            ParameterSpec::new("threshold", ParamKind::Number, false)
                .with_comparison(Comparison::Lt),
        ],
        "SELECT project, material_code, material_name, batch_code, supplier_name, factory, \
         defect_rate::float8 AS defect_rate, online_date FROM online_tracking \
         WHERE supplier_name LIKE {supplier} AND project LIKE {project} \
         AND ({threshold}::float8 IS NULL OR defect_rate::float8 < {threshold}::float8) \
         ORDER BY online_date DESC LIMIT 500",
        10,
    );
    online_below.patterns = vec!["不良率.*(低于|小于|少于|<)".into()];
    online_below.example_query = Some("上线不良率低于3%的项目".into());

    let mut lab = rule(
        "test-records",
        "测试记录查询",
        Scenario::Test,
        &["测试", "检验", "测试记录"],
        vec![
            ParameterSpec::new("test_result", ParamKind::Enum, false).with_values(&["NG", "OK"]),
            ParameterSpec::new("supplier", ParamKind::FuzzyString, false),
            ParameterSpec::new("since", ParamKind::Date, false),
        ],
        "SELECT test_id, material_code, batch_code, project, supplier_name, test_item, \
         test_result, test_date FROM lab_tests \
         WHERE test_result LIKE {test_result} AND supplier_name LIKE {supplier} \
         AND ({since}::date IS NULL OR test_date >= {since}::date) \
         ORDER BY test_date DESC LIMIT 500",
        10,
    );
    lab.synonyms.insert(
        "NG".into(),
        vec!["失败".into(), "不合格".into(), "不通过".into()],
    );
    lab.synonyms.insert("OK".into(), vec!["通过".into(), "合格".into()]);
    lab.example_query = Some("查询测试失败的记录".into());

    let explore = rule(
        "exploration-material",
        "物料全景探索",
        Scenario::Exploration,
        &["探索", "全景", "概览"],
        vec![ParameterSpec::new("material", ParamKind::FuzzyString, false)],
        "SELECT material_code, material_name, supplier_name, factory, status FROM inventory \
         WHERE material_name LIKE {material} LIMIT 500",
        0,
    );

    let mut legacy = rule(
        "inventory-legacy",
        "旧版库存查询",
        Scenario::Inventory,
        &["库存"],
        vec![],
        "SELECT * FROM inventory_legacy",
        100,
    );
    legacy.status = RuleStatus::Inactive;

    vec![
        general,
        supplier,
        risk,
        frozen,
        material,
        batch,
        online,
        online_below,
        lab,
        explore,
        legacy,
    ]
}

pub fn sample_dictionaries() -> Dictionaries {
    let list = |items: &[&str]| -> Vec<String> { items.iter().map(|s| (*s).to_string()).collect() };
    Dictionaries {
        suppliers: list(&["聚龙", "聚龙光电", "欣旺达", "德赛", "BOE", "天马"]),
        materials: list(&["电池盖板", "显示屏", "电芯", "摄像头模组", "主板"]),
        factories: list(&["重庆工厂", "深圳工厂", "宜宾工厂"]),
        statuses: list(&["正常", "风险", "冻结"]),
        projects: list(&["Apollo", "Orion", "Vega"]),
    }
}

fn to_rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

fn sample_inventory() -> Vec<Row> {
    let row = |code: &str, name: &str, batch: &str, supplier: &str, factory: &str, qty: u32, status: &str, date: &str| {
        json!({
            "material_code": code, "material_name": name, "batch_code": batch,
            "supplier_name": supplier, "factory": factory, "quantity": qty,
            "status": status, "inbound_date": date
        })
    };
    to_rows(vec![
        row("M-BAT-001", "电池盖板", "JL240301", "聚龙", "重庆工厂", 1200, "正常", "2024-03-01"),
        row("M-BAT-001", "电池盖板", "JL240315", "聚龙", "重庆工厂", 800, "风险", "2024-03-15"),
        row("M-LCD-002", "显示屏", "JLG24031", "聚龙光电", "深圳工厂", 300, "冻结", "2024-03-10"),
        row("M-CEL-003", "电芯", "XWD24020", "欣旺达", "宜宾工厂", 5000, "正常", "2024-02-20"),
        row("M-CEL-003", "电芯", "XWD24041", "欣旺达", "宜宾工厂", 2600, "风险", "2024-04-01"),
        row("M-LCD-002", "显示屏", "BOE24033", "BOE", "深圳工厂", 900, "正常", "2024-03-30"),
        row("M-CAM-004", "摄像头模组", "TM240402", "天马", "深圳工厂", 450, "冻结", "2024-04-02"),
        row("M-MBD-005", "主板", "DS240405", "德赛", "重庆工厂", 700, "正常", "2024-04-05"),
    ])
}

fn sample_online_tracking() -> Vec<Row> {
    to_rows(vec![
        json!({"project": "Apollo", "material_code": "M-BAT-001", "material_name": "电池盖板", "batch_code": "JL240301", "supplier_name": "聚龙", "factory": "重庆工厂", "defect_rate": "1.2%", "online_date": "2024-03-05"}),
        json!({"project": "Apollo", "material_code": "M-CEL-003", "material_name": "电芯", "batch_code": "XWD24020", "supplier_name": "欣旺达", "factory": "宜宾工厂", "defect_rate": 3.8, "online_date": "2024-03-06"}),
        json!({"project": "Orion", "material_code": "M-LCD-002", "material_name": "显示屏", "batch_code": "BOE24033", "supplier_name": "BOE", "factory": "深圳工厂", "defect_rate": "4.5%", "online_date": "2024-04-02"}),
        json!({"project": "Orion", "material_code": "M-CAM-004", "material_name": "摄像头模组", "batch_code": "TM240402", "supplier_name": "天马", "factory": "深圳工厂", "defect_rate": 0.9, "online_date": "2024-04-06"}),
        json!({"project": "Vega", "material_code": "M-MBD-005", "material_name": "主板", "batch_code": "DS240405", "supplier_name": "德赛", "factory": "重庆工厂", "defect_rate": "2.0%", "online_date": "2024-04-08"}),
        json!({"project": "Vega", "material_code": "M-BAT-001", "material_name": "电池盖板", "batch_code": "JL240315", "supplier_name": "聚龙", "factory": "重庆工厂", "defect_rate": 3.2, "online_date": "2024-04-10"}),
    ])
}

fn sample_lab_tests() -> Vec<Row> {
    to_rows(vec![
        json!({"test_id": "T001", "material_code": "M-BAT-001", "batch_code": "JL240301", "project": "Apollo", "supplier_name": "聚龙", "test_item": "跌落测试", "test_result": "OK", "test_date": "2024-03-03"}),
        json!({"test_id": "T002", "material_code": "M-BAT-001", "batch_code": "JL240315", "project": "Vega", "supplier_name": "聚龙", "test_item": "盐雾测试", "test_result": "NG", "test_date": "2024-03-18"}),
        json!({"test_id": "T003", "material_code": "M-CEL-003", "batch_code": "XWD24041", "project": "Apollo", "supplier_name": "欣旺达", "test_item": "高温循环", "test_result": "NG", "test_date": "2024-04-03"}),
        json!({"test_id": "T004", "material_code": "M-CEL-003", "batch_code": "XWD24041", "project": "Apollo", "supplier_name": "欣旺达", "test_item": "短路测试", "test_result": "NG", "test_date": "2024-04-04"}),
        json!({"test_id": "T005", "material_code": "M-LCD-002", "batch_code": "BOE24033", "project": "Orion", "supplier_name": "BOE", "test_item": "外观检验", "test_result": "OK", "test_date": "2024-04-01"}),
        json!({"test_id": "T006", "material_code": "M-CAM-004", "batch_code": "TM240402", "project": "Orion", "supplier_name": "天马", "test_item": "解析力测试", "test_result": "NG", "test_date": "2024-04-05"}),
    ])
}
