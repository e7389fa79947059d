use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::keys::new_id;
use crate::{
    db::store::{within, IdentityStore},
    error::{AuthError, Result},
    model::qr_session::{QrSession, QrStatus},
};

pub const DEFAULT_QR_TTL: Duration = Duration::from_secs(5 * 60);

/// What a freshly generated handshake exposes. Never carries a key.
#[derive(Debug, Clone, Serialize)]
pub struct QrTicket {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

/// Poll view of a handshake.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QrPoll {
    Pending,
    Completed {
        floatplane_user_id: String,
        api_key: String,
    },
    Expired,
}

pub struct QrSessionManager {
    store: Arc<dyn IdentityStore>,
    ttl: chrono::Duration,
    timeout: Duration,
}

impl QrSessionManager {
    pub fn new(store: Arc<dyn IdentityStore>, ttl: Duration, timeout: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5));
        Self {
            store,
            ttl,
            timeout,
        }
    }

    pub async fn generate(&self) -> Result<QrTicket> {
        self.generate_at(Utc::now()).await
    }

    pub async fn generate_at(&self, now: DateTime<Utc>) -> Result<QrTicket> {
        let session = QrSession::pending(new_id(), now, now + self.ttl);

        within(self.timeout, self.store.insert_qr_session(&session))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to create QR session"))?;

        info!(qr_id = %session.id, expires_at = %session.expires_at, "qr session created");
        Ok(QrTicket {
            id: session.id,
            expires_at: session.expires_at,
        })
    }

    pub async fn poll(&self, id: &str) -> Result<QrPoll> {
        self.poll_at(id, Utc::now()).await
    }

    pub async fn poll_at(&self, id: &str, now: DateTime<Utc>) -> Result<QrPoll> {
        let session = within(self.timeout, self.store.find_qr_session(id))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to load QR session"))?
            .ok_or_else(|| AuthError::not_found("Session not found"))?;

        // Expiry is derived at read time and overrides whatever is stored.
        if session.is_expired_at(now) {
            debug!(qr_id = %id, "qr session past expiry");
            return Ok(QrPoll::Expired);
        }

        Ok(match session.status {
            QrStatus::Pending => QrPoll::Pending,
            QrStatus::Completed => QrPoll::Completed {
                floatplane_user_id: session.floatplane_user_id.unwrap_or_default(),
                api_key: session.api_key.unwrap_or_default(),
            },
            QrStatus::Expired => QrPoll::Expired,
        })
    }
}
