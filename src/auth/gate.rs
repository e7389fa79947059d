use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::Utc;
use tracing::debug;

use crate::{
    db::store::{within, IdentityStore},
    error::{AuthError, BestEffort, Result},
    model::user::User,
    state::AppState,
};

const BAD_HEADER: &str = "Missing or invalid Authorization header. Expected: Bearer {api_key}";

/// Pulls `<token>` out of exactly `Bearer <token>`.
pub fn bearer_token(header_value: Option<&str>) -> Option<&str> {
    let mut parts = header_value?.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()))
}

/// Resolves bearer API keys to users. An unknown key is the only revocation signal.
pub struct AuthGate {
    store: Arc<dyn IdentityStore>,
    timeout: Duration,
}

impl AuthGate {
    pub fn new(store: Arc<dyn IdentityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<User> {
        let api_key =
            bearer_token(authorization).ok_or_else(|| AuthError::unauthorized(BAD_HEADER))?;

        let session = within(self.timeout, self.store.find_session_by_key(api_key))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to load session"))?
            .ok_or_else(|| AuthError::unauthorized("Invalid API key"))?;

        let user = within(self.timeout, self.store.find_user(&session.floatplane_user_id))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to load user"))?
            .ok_or_else(|| AuthError::unauthorized("User not found"))?;

        let touched = BestEffort::observe(
            "touch_session",
            within(self.timeout, self.store.touch_session(&session.id, Utc::now())).await,
        );
        debug!(user_id = %user.floatplane_user_id, ?touched, "request authenticated");

        Ok(user)
    }
}

/// Extractor for routes behind the gate.
pub struct AuthenticatedUser(pub User);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let user = state.gate.authenticate(header_value).await?;
        Ok(AuthenticatedUser(user))
    }
}
