use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{device_session::DeviceSession, qr_session::QrSession, user::User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique index {index} violated")]
    UniqueViolation { index: &'static str },

    #[error("store call timed out")]
    Timeout,

    #[error("rocksdb: {0}")]
    Rocks(#[from] rocksdb::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt record at {key}")]
    Corrupt { key: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for users, device sessions and QR handshakes.
///
/// Every method is one independent operation. Inserts report unique index
/// violations as [`StoreError::UniqueViolation`]; `replace_*` and
/// `complete_qr_session` are conditional and return the number of rows changed.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user(&self, floatplane_user_id: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn replace_user_key(&self, old_key: &str, new_key: &str) -> StoreResult<u64>;

    async fn find_session_by_jkt(&self, dpop_jkt: &str) -> StoreResult<Option<DeviceSession>>;
    async fn find_session_by_key(&self, api_key: &str) -> StoreResult<Option<DeviceSession>>;
    async fn insert_session(&self, session: &DeviceSession) -> StoreResult<()>;
    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<u64>;
    async fn replace_session_key(&self, old_key: &str, new_key: &str) -> StoreResult<u64>;

    async fn insert_qr_session(&self, session: &QrSession) -> StoreResult<()>;
    async fn find_qr_session(&self, id: &str) -> StoreResult<Option<QrSession>>;
    /// Write path of the out-of-band completion agent. Only pending rows move.
    async fn complete_qr_session(
        &self,
        id: &str,
        floatplane_user_id: &str,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Hook into the playlist subsystem, used to seed a new user's reserved list.
#[async_trait]
pub trait PlaylistSeeder: Send + Sync {
    async fn ensure_watch_later(&self, floatplane_user_id: &str) -> StoreResult<()>;
}

/// Runs one store call under the request deadline.
pub async fn within<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn within_reports_timeout() {
        let res: StoreResult<()> = within(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(StoreError::Timeout)));
    }
}
