use axum::{routing::get, Router};

use crate::state::AppState;

pub mod handlers;

use handlers::{health_handler, root_handler};

/// Service metadata and liveness.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}
