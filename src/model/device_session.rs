use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One (user, DPoP-bound device) pairing and its current bearer key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSession {
    pub id: String,                 // 16 random bytes, hex
    pub floatplane_user_id: String, // FK -> User.floatplane_user_id
    pub api_key: String,            // unique
    pub dpop_jkt: String,           // unique
    #[serde(default)]
    pub device_info: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}
