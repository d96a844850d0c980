//! Dictionary refresh endpoint.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DictionaryReport {
    pub suppliers: usize,
    pub materials: usize,
    pub factories: usize,
    pub statuses: usize,
    pub projects: usize,
    pub refreshed_at: DateTime<Utc>,
}

/// POST /api/v1/dictionaries/refresh: reload entity dictionaries.
pub async fn refresh_dictionaries(State(state): State<AppState>) -> ApiResult<Json<DictionaryReport>> {
    let d = state.dictionaries().refresh().await?;
    Ok(Json(DictionaryReport {
        suppliers: d.suppliers.len(),
        materials: d.materials.len(),
        factories: d.factories.len(),
        statuses: d.statuses.len(),
        projects: d.projects.len(),
        refreshed_at: Utc::now(),
    }))
}
