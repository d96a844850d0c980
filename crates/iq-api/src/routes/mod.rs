//! API route definitions and router builder.

pub mod dictionaries;
pub mod health;
pub mod query;
pub mod rules;

use axum::Router;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Resolution
        .route("/query", post(query::resolve))
        .route("/query/explain", post(query::explain))
        // Rules
        .route("/rules", get(rules::list_rules))
        .route("/rules/refresh", post(rules::refresh_rules))
        .route("/rules/{id}", get(rules::get_rule))
        // Dictionaries
        .route(
            "/dictionaries/refresh",
            post(dictionaries::refresh_dictionaries),
        );

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(AppState::with_sample_data())
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (status, json) = get_json(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["rules"]["active"].as_u64().unwrap() > 0);
        assert_eq!(json["database"], false);
    }

    #[tokio::test]
    async fn query_supplier_inventory() {
        let (status, json) = post_json(
            app(),
            "/api/v1/query",
            serde_json::json!({"queryText": "查询聚龙供应商的库存"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["matchedRuleName"], "供应商库存查询");
        assert_eq!(json["rowCount"], 3);
        assert_eq!(json["parameters"]["supplier"]["rawText"], "聚龙");
        assert!(json["summaryCards"].as_array().unwrap().len() >= 5);
    }

    #[tokio::test]
    async fn query_accepts_snake_case_field() {
        let (status, json) = post_json(
            app(),
            "/api/v1/query",
            serde_json::json!({"query_text": "目前有哪些风险库存？"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["matchedRuleName"], "风险库存查询");
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let (status, json) =
            post_json(app(), "/api/v1/query", serde_json::json!({"queryText": "   "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], 400);
    }

    #[tokio::test]
    async fn unmatched_query_uses_fallback() {
        let (status, json) = post_json(
            app(),
            "/api/v1/query",
            serde_json::json!({"queryText": "asdkjalksd"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["fallback"], true);
        assert_eq!(json["matchedRuleName"], "通用库存查询");
        assert!(json["narrative"].as_str().unwrap().contains("fallback"));
    }

    #[tokio::test]
    async fn explain_reports_sql_without_values() {
        let (status, json) = post_json(
            app(),
            "/api/v1/query/explain",
            serde_json::json!({"queryText": "查询聚龙供应商的库存"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["selectedRule"], "供应商库存查询");
        assert_eq!(json["paramNames"], serde_json::json!(["supplier"]));
        let sql = json["sql"].as_str().unwrap();
        assert!(sql.contains("$1"));
        assert!(!sql.contains("聚龙"));
    }

    #[tokio::test]
    async fn list_rules_includes_inactive() {
        let (status, json) = get_json(app(), "/api/v1/rules").await;
        assert_eq!(status, StatusCode::OK);
        let rules = json["rules"].as_array().unwrap();
        assert!(rules.iter().any(|r| r["status"] == "inactive"));
        assert!(json["rejected"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_rule_by_id_and_name() {
        let (status, json) = get_json(app(), "/api/v1/rules/inventory-risk").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "风险库存查询");

        let uri = format!(
            "/api/v1/rules/{}",
            "%E9%A3%8E%E9%99%A9%E5%BA%93%E5%AD%98%E6%9F%A5%E8%AF%A2"
        );
        let (status, json) = get_json(app(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "inventory-risk");
    }

    #[tokio::test]
    async fn get_rule_not_found() {
        let (status, _) = get_json(app(), "/api/v1/rules/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refresh_rules_returns_report() {
        let (status, json) = post_json(app(), "/api/v1/rules/refresh", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "mock");
        assert_eq!(json["rejected"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn refresh_dictionaries_returns_counts() {
        let (status, json) =
            post_json(app(), "/api/v1/dictionaries/refresh", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["suppliers"], 6);
        assert!(json["refreshed_at"].is_string());
    }
}
