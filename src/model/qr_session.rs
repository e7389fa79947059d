use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QrStatus {
    Pending,
    Completed,
    /// Only ever written by an outside sweeper; reads derive expiry from `expires_at`.
    Expired,
}

/// Short-lived cross-device login handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QrSession {
    pub id: String,
    pub status: QrStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub floatplane_user_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QrSession {
    pub fn pending(id: String, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: QrStatus::Pending,
            expires_at,
            created_at: now,
            device_info: None,
            floatplane_user_id: None,
            api_key: None,
            completed_at: None,
        }
    }

    /// Strictly after `expires_at`; the boundary instant itself is still live.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
