use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::error;

use crate::{db::store::within, state::AppState};

pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "Floatplane Companion API",
        "status": "running"
    }))
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let limit = std::time::Duration::from_secs(2);
    match within(limit, state.store.ping()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": e.to_string() })),
            )
        }
    }
}
