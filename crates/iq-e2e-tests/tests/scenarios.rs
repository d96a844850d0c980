//! E2E tests for full question → rows → summary flows through the HTTP API.

mod helpers;

use axum::http::StatusCode;
use serde_json::{Value, json};

use helpers::{TestHarness, record, sample_records};
use iq_engine::ResolverConfig;

fn card(response: &Value, key: &str) -> u64 {
    response["summaryCards"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["key"] == key)
        .and_then(|c| c["value"].as_u64())
        .unwrap_or_else(|| panic!("missing summary card '{key}'"))
}

/// Supplier inventory: the supplier is extracted from the dictionary, bound
/// as a LIKE pattern, and never spliced into the SQL text.
#[tokio::test]
async fn e2e_supplier_inventory() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("查询聚龙供应商的库存").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["fallback"], false);
    assert_eq!(json["matchedRuleName"], "供应商库存查询");
    assert_eq!(json["scenario"], "inventory");
    assert_eq!(json["parameters"]["supplier"]["rawText"], "聚龙");
    assert_eq!(json["rowCount"], 3);

    let rows = json["tableData"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(
        rows.iter()
            .all(|r| r["supplier_name"].as_str().unwrap().contains("聚龙"))
    );

    assert_eq!(card(&json, "suppliers"), 2);
    assert_eq!(card(&json, "batches"), 3);
    assert_eq!(card(&json, "risk"), 1);
    assert_eq!(card(&json, "frozen"), 1);

    let queries = h.store.queries();
    assert_eq!(queries.len(), 1);
    assert!(!queries[0].sql.contains("聚龙"));
    assert!(!queries[0].sql.contains('{'));
    assert_eq!(queries[0].param_names, vec!["supplier"]);
}

/// Risk inventory: the fixed status parameter is bound without appearing in
/// the question, and the optional supplier becomes a wildcard.
#[tokio::test]
async fn e2e_risk_inventory_fixed_status() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("目前有哪些风险库存？").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matchedRuleName"], "风险库存查询");
    assert_eq!(json["parameters"]["status"]["kind"], "fixed");
    assert_eq!(json["parameters"]["status"]["normalizedValue"]["value"], "风险");
    assert_eq!(json["wildcards"], json!(["supplier"]));
    assert_eq!(json["rowCount"], 2);
    assert_eq!(card(&json, "risk"), 2);
    assert!(
        json["tableData"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["status"] == "风险")
    );
    assert!(json["narrative"].as_str().unwrap().contains("风险"));
}

/// Gibberish falls back to the configured rule and says so.
#[tokio::test]
async fn e2e_unmatched_question_uses_fallback() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("asdkjalksd").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["fallback"], true);
    assert_eq!(json["matchedRuleName"], "通用库存查询");
    assert_eq!(json["rowCount"], 8);
    assert_eq!(card(&json, "materials"), 5);
    assert!(json["narrative"].as_str().unwrap().contains("fallback rule"));
}

/// The default configuration answers gibberish with the catch-all rule.
#[tokio::test]
async fn e2e_default_config_falls_back_to_catch_all() {
    let h = TestHarness::with_config(ResolverConfig::default());

    let (status, json) = h.query("asdkjalksd").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["fallback"], true);
    assert_eq!(json["matchedRuleName"], "通用库存查询");
    assert_eq!(json["rowCount"], 8);
}

/// With the fallback switched off the same question yields an explained
/// empty answer.
#[tokio::test]
async fn e2e_unmatched_question_without_fallback() {
    let h = TestHarness::with_config(ResolverConfig {
        fallback_enabled: false,
        ..Default::default()
    });

    let (status, json) = h.query("asdkjalksd").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert!(json["matchedRuleName"].is_null());
    assert_eq!(json["tableData"], json!([]));
    assert!(!json["narrative"].as_str().unwrap().is_empty());
    assert_eq!(h.store.query_count(), 0);
}

/// Failed tests: the synonym 失败 maps onto the NG enum value and the
/// summary counts distinct failing batches.
#[tokio::test]
async fn e2e_failed_test_records() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("查询测试失败的记录").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matchedRuleName"], "测试记录查询");
    assert_eq!(json["scenario"], "test");
    assert_eq!(json["parameters"]["test_result"]["rawText"], "失败");
    assert_eq!(
        json["parameters"]["test_result"]["normalizedValue"]["value"],
        "NG"
    );
    assert_eq!(json["rowCount"], 4);
    assert_eq!(card(&json, "ng_batches"), 3);
    assert!(
        json["tableData"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["test_result"] == "NG")
    );
}

/// A rule whose template references an undeclared `{batch}` is rejected at
/// load time while every other rule stays usable.
#[tokio::test]
async fn e2e_malformed_rule_rejected_rest_load() {
    let mut records = sample_records();
    let expected_valid = records.len();
    records.push(record(json!({
        "id": "inventory-trace",
        "intent_name": "批次追溯查询",
        "category": "库存场景",
        "trigger_words": "追溯,批次追溯",
        "action_target": "SELECT * FROM inventory WHERE batch_code = {batch}",
        "parameters": [],
        "priority": 50,
        "status": "active"
    })));
    let h = TestHarness::with_records(records, ResolverConfig::default());

    let (status, json) = h.get("/api/v1/rules").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rules"].as_array().unwrap().len(), expected_valid);
    let rejected = json["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["rule"], "批次追溯查询");
    assert!(rejected[0]["reason"].as_str().unwrap().contains("batch"));

    let (status, _) = h.get("/api/v1/rules/inventory-trace").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = h.query("批次追溯 JL240301").await;
    assert_ne!(json["matchedRuleName"], "批次追溯查询");

    let (_, json) = h.query("查询聚龙供应商的库存").await;
    assert_eq!(json["success"], true);
    assert_eq!(json["rowCount"], 3);
}

/// Production defect rates: the numeric threshold is extracted and the
/// summary splits rows at the configured cutoff.
#[tokio::test]
async fn e2e_production_defect_rate_threshold() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("上线不良率超过3%的项目").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matchedRuleName"], "上线不良率查询");
    assert_eq!(json["scenario"], "production");
    assert_eq!(json["parameters"]["threshold"]["normalizedValue"]["value"], 3.0);
    assert_eq!(json["rowCount"], 3);
    assert_eq!(card(&json, "over_threshold"), 3);
    assert_eq!(card(&json, "within_threshold"), 0);
}

/// Explain reports the candidate ranking and bound SQL, and runs nothing.
#[tokio::test]
async fn e2e_explain_does_not_execute() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.explain("查询聚龙供应商的库存").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selectedRule"], "供应商库存查询");
    let candidates = json["candidates"].as_array().unwrap();
    assert_eq!(candidates[0]["ruleName"], "供应商库存查询");
    assert!(
        candidates
            .windows(2)
            .all(|w| w[0]["score"].as_u64() >= w[1]["score"].as_u64())
    );
    assert!(!json["sql"].as_str().unwrap().contains("聚龙"));
    assert_eq!(h.store.query_count(), 0);
}

/// "Below" questions bind the threshold to the below rule instead of the
/// "above" one.
#[tokio::test]
async fn e2e_production_defect_rate_below_threshold() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("上线不良率低于3%的项目").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["matchedRuleName"], "上线不良率低于查询");
    assert_eq!(json["parameters"]["threshold"]["normalizedValue"]["value"], 3.0);
    assert_eq!(json["rowCount"], 3);
    assert_eq!(card(&json, "within_threshold"), 3);
    assert_eq!(card(&json, "over_threshold"), 0);
}

/// A matched rule whose query returns nothing says so rather than reporting
/// zero findings.
#[tokio::test]
async fn e2e_empty_result_is_explained() {
    let h = TestHarness::with_sample_data();

    let (status, json) = h.query("宜宾工厂的冻结库存").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["matchedRuleName"], "冻结库存查询");
    assert_eq!(json["rowCount"], 0);
    assert!(json["narrative"].as_str().unwrap().contains("returned nothing"));
}
