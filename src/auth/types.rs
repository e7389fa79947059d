use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub dpop_proof: String,
    #[serde(default)]
    pub device_info: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub api_key: String,
    pub floatplane_user_id: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
