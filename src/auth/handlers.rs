use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use super::{
    gate::{bearer_from_headers, AuthenticatedUser},
    qr::{QrPoll, QrTicket},
    types::{LoginRequest, LoginResponse, MessageResponse},
};
use crate::{
    error::{AuthError, Result},
    state::AppState,
};

pub async fn generate_qr_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<QrTicket>)> {
    let ticket = state.qr.generate().await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn poll_qr_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QrPoll>> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AuthError::bad_request("Missing ID"));
    }
    Ok(Json(state.qr.poll(id).await?))
}

pub async fn poll_qr_missing_id() -> AuthError {
    AuthError::bad_request("Missing ID")
}

pub async fn login_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let Json(req) = payload.map_err(|_| AuthError::bad_request("Invalid body"))?;

    let out = state
        .binder
        .login(&req.access_token, &req.dpop_proof, &req.device_info)
        .await?;

    let message = if out.is_new_user {
        "User registered successfully"
    } else {
        "User logged in successfully"
    };
    Ok(Json(LoginResponse {
        api_key: out.api_key,
        floatplane_user_id: out.floatplane_user_id,
        message,
    }))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>> {
    let current_key = bearer_from_headers(&headers)
        .ok_or_else(|| AuthError::unauthorized("Invalid Authorization header"))?;

    let rotated = state.rotator.rotate(current_key).await?;
    info!(user_id = %user.floatplane_user_id, ?rotated, "logout");

    Ok(Json(MessageResponse {
        message: "Logged out successfully. API key invalidated.",
    }))
}
