//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health: liveness check with the size of the loaded rule set.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let rules = state.rules().snapshot();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rules": {
            "active": rules.active().len(),
            "rejected": rules.rejected().len(),
        },
        "database": state.pool.is_some(),
    }))
}
