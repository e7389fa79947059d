pub mod dpop;
pub mod gate;
pub mod handlers;
pub mod jose;
pub mod keys;
pub mod login;
pub mod qr;
pub mod rotate;
pub mod token;
pub mod types;

use std::sync::Arc;

use crate::{
    config::Config,
    middleware::rate_limit::{rate_limit, RateLimiter},
    state::AppState,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use handlers::{
    generate_qr_handler, login_handler, logout_handler, poll_qr_handler, poll_qr_missing_id,
};

/// Auth router: QR handshake, DPoP login, logout.
///
/// Login and the QR endpoints are limited per client address.
pub fn router(config: &Config) -> Router<AppState> {
    let limits = config.rate_limits;
    let login = Arc::new(RateLimiter::per_minute("login", limits.login));
    let qr_generate = Arc::new(RateLimiter::per_minute("qr_generate", limits.qr_generate));
    let qr_poll = Arc::new(RateLimiter::per_minute("qr_poll", limits.qr_poll));

    Router::new()
        .route(
            "/auth/qr/generate",
            post(generate_qr_handler).layer(from_fn_with_state(qr_generate, rate_limit)),
        )
        .route(
            "/auth/qr/poll/{id}",
            get(poll_qr_handler).layer(from_fn_with_state(qr_poll.clone(), rate_limit)),
        )
        .route(
            "/auth/qr/poll/",
            get(poll_qr_missing_id).layer(from_fn_with_state(qr_poll, rate_limit)),
        )
        .route(
            "/auth/login",
            post(login_handler).layer(from_fn_with_state(login, rate_limit)),
        )
        .route("/auth/logout", post(logout_handler))
}
