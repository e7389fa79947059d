use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account anchored on the upstream platform's user identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub floatplane_user_id: String,
    /// Legacy per-user key. Requests authenticate through device sessions;
    /// this key is only ever rotated, never looked up by the gate.
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl User {
    pub fn new(floatplane_user_id: &str, api_key: String, now: DateTime<Utc>) -> Self {
        Self {
            floatplane_user_id: floatplane_user_id.to_string(),
            api_key,
            created_at: now,
            last_accessed_at: now,
        }
    }
}
