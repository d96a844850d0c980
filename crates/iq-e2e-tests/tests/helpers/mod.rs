//! Shared test harness for E2E integration tests.
//!
//! Wires the API router to the engine over a `MockRuleSource` and a
//! `MockStore` whose handles stay with the test, so rule refreshes and store
//! failures can be scripted between requests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use iq_api::routes::build_router;
use iq_api::state::{AppState, SAMPLE_FALLBACK_RULE};
use iq_engine::{
    AggregatorConfig, DictionaryStore, MockRuleSource, MockStore, Resolver, ResolverConfig,
    RuleRecord, RuleRepository, sample_dictionaries, sample_rules,
};

/// End-to-end harness: router + resolver over mock rule source and store.
pub struct TestHarness {
    /// Application state shared with the router.
    pub state: AppState,
    /// Axum router for HTTP requests via `tower::oneshot`.
    pub router: Router,
    /// Rule source behind the repository; change it, then refresh.
    pub rule_source: Arc<MockRuleSource>,
    /// Sample tables; records every bound query.
    pub store: Arc<MockStore>,
}

impl TestHarness {
    /// Sample rules, dictionaries and tables, with the sample fallback rule.
    pub fn with_sample_data() -> Self {
        Self::with_config(ResolverConfig {
            fallback_rule: Some(SAMPLE_FALLBACK_RULE.to_string()),
            ..Default::default()
        })
    }

    /// Sample rules under a custom resolver configuration.
    pub fn with_config(config: ResolverConfig) -> Self {
        let records = sample_rules().iter().map(RuleRecord::from_rule).collect();
        Self::with_records(records, config)
    }

    /// Arbitrary rule records (validated like any other load).
    pub fn with_records(records: Vec<RuleRecord>, config: ResolverConfig) -> Self {
        let rule_source = Arc::new(MockRuleSource::new(records.clone()));
        let store = Arc::new(MockStore::with_sample_data());
        let (rules, _) = RuleRepository::preloaded(rule_source.clone(), records);

        let resolver = Resolver::new(
            Arc::new(rules),
            Arc::new(DictionaryStore::with_dictionaries(sample_dictionaries())),
            store.clone(),
            config,
            AggregatorConfig::default(),
        );
        let state = AppState::new(resolver);
        let router = build_router(state.clone());

        Self {
            state,
            router,
            rule_source,
            store,
        }
    }

    /// Ask a question via POST /api/v1/query.
    pub async fn query(&self, text: &str) -> (StatusCode, serde_json::Value) {
        self.post("/api/v1/query", serde_json::json!({ "queryText": text }))
            .await
    }

    /// Explain a question via POST /api/v1/query/explain.
    pub async fn explain(&self, text: &str) -> (StatusCode, serde_json::Value) {
        self.post("/api/v1/query/explain", serde_json::json!({ "queryText": text }))
            .await
    }

    /// Reload rules from `rule_source` via POST /api/v1/rules/refresh.
    pub async fn refresh_rules(&self) -> (StatusCode, serde_json::Value) {
        self.post("/api/v1/rules/refresh", serde_json::json!({})).await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }
}

/// Sample rules as records, for tests that append or edit rules.
pub fn sample_records() -> Vec<RuleRecord> {
    sample_rules().iter().map(RuleRecord::from_rule).collect()
}

/// Parse a rule record from authored JSON.
pub fn record(value: serde_json::Value) -> RuleRecord {
    serde_json::from_value(value).unwrap()
}
