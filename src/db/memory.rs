use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::store::{IdentityStore, PlaylistSeeder, StoreError, StoreResult};
use crate::model::{
    device_session::DeviceSession,
    qr_session::{QrSession, QrStatus},
    user::User,
};

/// Process-local store for development runs (`DB_PATH=:memory:`) and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
    #[cfg(test)]
    touch_fails: std::sync::atomic::AtomicBool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    sessions: HashMap<String, DeviceSession>,
    qr_sessions: HashMap<String, QrSession>,
    watch_later: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `touch_session` call fail with a timeout.
    #[cfg(test)]
    pub fn fail_touches(&self) {
        self.touch_fails
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    #[cfg(test)]
    pub async fn has_watch_later(&self, floatplane_user_id: &str) -> bool {
        self.inner
            .lock()
            .await
            .watch_later
            .contains(floatplane_user_id)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_user(&self, floatplane_user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(floatplane_user_id).cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut t = self.inner.lock().await;
        if t.users.contains_key(&user.floatplane_user_id) {
            return Err(StoreError::UniqueViolation {
                index: "users.floatplane_user_id",
            });
        }
        if t.users.values().any(|u| u.api_key == user.api_key) {
            return Err(StoreError::UniqueViolation {
                index: "users.api_key",
            });
        }
        t.users
            .insert(user.floatplane_user_id.clone(), user.clone());
        Ok(())
    }

    async fn replace_user_key(&self, old_key: &str, new_key: &str) -> StoreResult<u64> {
        let mut t = self.inner.lock().await;
        if t.users.values().any(|u| u.api_key == new_key) {
            return Err(StoreError::UniqueViolation {
                index: "users.api_key",
            });
        }
        match t.users.values_mut().find(|u| u.api_key == old_key) {
            Some(user) => {
                user.api_key = new_key.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_session_by_jkt(&self, dpop_jkt: &str) -> StoreResult<Option<DeviceSession>> {
        let t = self.inner.lock().await;
        Ok(t.sessions.values().find(|s| s.dpop_jkt == dpop_jkt).cloned())
    }

    async fn find_session_by_key(&self, api_key: &str) -> StoreResult<Option<DeviceSession>> {
        let t = self.inner.lock().await;
        Ok(t.sessions.values().find(|s| s.api_key == api_key).cloned())
    }

    async fn insert_session(&self, session: &DeviceSession) -> StoreResult<()> {
        let mut t = self.inner.lock().await;
        if t.sessions.values().any(|s| s.dpop_jkt == session.dpop_jkt) {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.dpop_jkt",
            });
        }
        if t.sessions.values().any(|s| s.api_key == session.api_key) {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.api_key",
            });
        }
        if t.sessions.contains_key(&session.id) {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.id",
            });
        }
        t.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        #[cfg(test)]
        if self.touch_fails.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        let mut t = self.inner.lock().await;
        match t.sessions.get_mut(session_id) {
            Some(session) => {
                session.last_accessed_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn replace_session_key(&self, old_key: &str, new_key: &str) -> StoreResult<u64> {
        let mut t = self.inner.lock().await;
        if t.sessions.values().any(|s| s.api_key == new_key) {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.api_key",
            });
        }
        match t.sessions.values_mut().find(|s| s.api_key == old_key) {
            Some(session) => {
                session.api_key = new_key.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_qr_session(&self, session: &QrSession) -> StoreResult<()> {
        let mut t = self.inner.lock().await;
        if t.qr_sessions.contains_key(&session.id) {
            return Err(StoreError::UniqueViolation {
                index: "qr_sessions.id",
            });
        }
        t.qr_sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_qr_session(&self, id: &str) -> StoreResult<Option<QrSession>> {
        Ok(self.inner.lock().await.qr_sessions.get(id).cloned())
    }

    async fn complete_qr_session(
        &self,
        id: &str,
        floatplane_user_id: &str,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut t = self.inner.lock().await;
        let Some(session) = t.qr_sessions.get_mut(id) else {
            return Ok(0);
        };
        if session.status != QrStatus::Pending || session.is_expired_at(now) {
            return Ok(0);
        }
        session.status = QrStatus::Completed;
        session.floatplane_user_id = Some(floatplane_user_id.to_string());
        session.api_key = Some(api_key.to_string());
        session.completed_at = Some(now);
        Ok(1)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl PlaylistSeeder for MemoryStore {
    async fn ensure_watch_later(&self, floatplane_user_id: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .await
            .watch_later
            .insert(floatplane_user_id.to_string());
        Ok(())
    }
}
