//! Question resolution endpoints.

use axum::Json;
use axum::extract::State;
use tracing::Instrument;
use uuid::Uuid;

use iq_engine::Explanation;
use iq_protocol::{ResolutionRequest, ResolutionResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Longest accepted question, in characters.
const MAX_QUERY_CHARS: usize = 500;

fn validate(request: &ResolutionRequest) -> ApiResult<()> {
    let len = request.query_text.trim().chars().count();
    if len == 0 {
        return Err(ApiError::BadRequest("queryText must not be empty".into()));
    }
    if len > MAX_QUERY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "queryText exceeds {MAX_QUERY_CHARS} characters"
        )));
    }
    Ok(())
}

/// POST /api/v1/query: resolve a question into rows and summary cards.
///
/// Resolution failures (no match, store unavailable) are reported in the
/// body with `success = false`, not as HTTP errors.
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolutionRequest>,
) -> ApiResult<Json<ResolutionResponse>> {
    validate(&request)?;
    let request_id = Uuid::now_v7();
    let span = tracing::info_span!("resolve", request_id = %request_id);

    let response = async {
        tracing::info!(scenario = ?request.scenario_hint(), "query received");
        let response = state.resolver.resolve(&request).await;
        tracing::info!(
            success = response.success,
            rule = response.matched_rule_name.as_deref().unwrap_or("-"),
            rows = response.row_count,
            "query answered"
        );
        response
    }
    .instrument(span)
    .await;
    Ok(Json(response))
}

/// POST /api/v1/query/explain: show how a question would be resolved,
/// without running the query.
pub async fn explain(
    State(state): State<AppState>,
    Json(request): Json<ResolutionRequest>,
) -> ApiResult<Json<Explanation>> {
    validate(&request)?;
    Ok(Json(state.resolver.explain(&request)))
}
