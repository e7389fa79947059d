pub mod memory;
pub mod store;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::model::{
    device_session::DeviceSession,
    qr_session::{QrSession, QrStatus},
    user::User,
};
use store::{IdentityStore, PlaylistSeeder, StoreError, StoreResult};

pub struct DBLayer {
    db: DB,
    // Serializes check-and-set writes so unique indexes hold like table constraints.
    write_lock: Mutex<()>,
}

impl DBLayer {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    // ============================================================
    // KEY LAYOUT
    // ============================================================
    fn user_key(id: &str) -> String {
        format!("user:{id}")
    }

    fn user_api_key_index(api_key: &str) -> String {
        format!("user_api_key:{api_key}")
    }

    fn session_key(id: &str) -> String {
        format!("device_session:{id}")
    }

    fn session_jkt_index(jkt: &str) -> String {
        format!("device_jkt:{jkt}")
    }

    fn session_api_key_index(api_key: &str) -> String {
        format!("device_api_key:{api_key}")
    }

    fn qr_key(id: &str) -> String {
        format!("qr_session:{id}")
    }

    fn watch_later_key(user_id: &str) -> String {
        format!("playlist:{user_id}:watch_later")
    }

    // ============================================================
    // RAW ACCESS
    // ============================================================
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.db.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        match self.db.get(key)? {
            Some(raw) => String::from_utf8(raw)
                .map(Some)
                .map_err(|_| StoreError::Corrupt {
                    key: key.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.db.get_pinned(key)?.is_some())
    }

    fn put_json<T: Serialize>(batch: &mut WriteBatch, key: &str, value: &T) -> StoreResult<()> {
        batch.put(key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn load_session_via(&self, index_key: &str) -> StoreResult<Option<DeviceSession>> {
        let Some(session_id) = self.get_str(index_key)? else {
            return Ok(None);
        };
        self.get_json(&Self::session_key(&session_id))
    }

    /// Number of records under `prefix`.
    #[cfg(test)]
    pub fn count_prefix(&self, prefix: &str) -> StoreResult<usize> {
        use rocksdb::{Direction, IteratorMode};

        let mut count = 0;
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl IdentityStore for DBLayer {
    // ============================================================
    // USERS
    // ============================================================
    async fn find_user(&self, floatplane_user_id: &str) -> StoreResult<Option<User>> {
        self.get_json(&Self::user_key(floatplane_user_id))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let key = Self::user_key(&user.floatplane_user_id);
        if self.exists(&key)? {
            return Err(StoreError::UniqueViolation {
                index: "users.floatplane_user_id",
            });
        }
        let key_index = Self::user_api_key_index(&user.api_key);
        if self.exists(&key_index)? {
            return Err(StoreError::UniqueViolation {
                index: "users.api_key",
            });
        }

        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, &key, user)?;
        batch.put(key_index, user.floatplane_user_id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    async fn replace_user_key(&self, old_key: &str, new_key: &str) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;

        let old_index = Self::user_api_key_index(old_key);
        let Some(user_id) = self.get_str(&old_index)? else {
            return Ok(0);
        };
        let user_key = Self::user_key(&user_id);
        let Some(mut user) = self.get_json::<User>(&user_key)? else {
            return Ok(0);
        };
        if user.api_key != old_key {
            return Ok(0);
        }
        let new_index = Self::user_api_key_index(new_key);
        if self.exists(&new_index)? {
            return Err(StoreError::UniqueViolation {
                index: "users.api_key",
            });
        }

        user.api_key = new_key.to_string();
        let mut batch = WriteBatch::default();
        batch.delete(old_index);
        batch.put(new_index, user_id.as_bytes());
        Self::put_json(&mut batch, &user_key, &user)?;
        self.db.write(batch)?;
        Ok(1)
    }

    // ============================================================
    // DEVICE SESSIONS
    // ============================================================
    async fn find_session_by_jkt(&self, dpop_jkt: &str) -> StoreResult<Option<DeviceSession>> {
        Ok(self
            .load_session_via(&Self::session_jkt_index(dpop_jkt))?
            .filter(|s| s.dpop_jkt == dpop_jkt))
    }

    async fn find_session_by_key(&self, api_key: &str) -> StoreResult<Option<DeviceSession>> {
        Ok(self
            .load_session_via(&Self::session_api_key_index(api_key))?
            .filter(|s| s.api_key == api_key))
    }

    async fn insert_session(&self, session: &DeviceSession) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let key = Self::session_key(&session.id);
        let jkt_index = Self::session_jkt_index(&session.dpop_jkt);
        let key_index = Self::session_api_key_index(&session.api_key);

        if self.exists(&jkt_index)? {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.dpop_jkt",
            });
        }
        if self.exists(&key_index)? {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.api_key",
            });
        }
        if self.exists(&key)? {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.id",
            });
        }

        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, &key, session)?;
        batch.put(jkt_index, session.id.as_bytes());
        batch.put(key_index, session.id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;

        let key = Self::session_key(session_id);
        let Some(mut session) = self.get_json::<DeviceSession>(&key)? else {
            return Ok(0);
        };
        session.last_accessed_at = now;
        self.db.put(key, serde_json::to_vec(&session)?)?;
        Ok(1)
    }

    async fn replace_session_key(&self, old_key: &str, new_key: &str) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;

        let old_index = Self::session_api_key_index(old_key);
        let Some(mut session) = self.load_session_via(&old_index)? else {
            return Ok(0);
        };
        if session.api_key != old_key {
            return Ok(0);
        }
        let new_index = Self::session_api_key_index(new_key);
        if self.exists(&new_index)? {
            return Err(StoreError::UniqueViolation {
                index: "device_sessions.api_key",
            });
        }

        session.api_key = new_key.to_string();
        let mut batch = WriteBatch::default();
        batch.delete(old_index);
        batch.put(new_index, session.id.as_bytes());
        Self::put_json(&mut batch, &Self::session_key(&session.id), &session)?;
        self.db.write(batch)?;
        Ok(1)
    }

    // ============================================================
    // QR SESSIONS
    // ============================================================
    async fn insert_qr_session(&self, session: &QrSession) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let key = Self::qr_key(&session.id);
        if self.exists(&key)? {
            return Err(StoreError::UniqueViolation {
                index: "qr_sessions.id",
            });
        }
        self.db.put(key, serde_json::to_vec(session)?)?;
        Ok(())
    }

    async fn find_qr_session(&self, id: &str) -> StoreResult<Option<QrSession>> {
        self.get_json(&Self::qr_key(id))
    }

    async fn complete_qr_session(
        &self,
        id: &str,
        floatplane_user_id: &str,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;

        let key = Self::qr_key(id);
        let Some(mut session) = self.get_json::<QrSession>(&key)? else {
            return Ok(0);
        };
        if session.status != QrStatus::Pending || session.is_expired_at(now) {
            return Ok(0);
        }

        session.status = QrStatus::Completed;
        session.floatplane_user_id = Some(floatplane_user_id.to_string());
        session.api_key = Some(api_key.to_string());
        session.completed_at = Some(now);
        self.db.put(key, serde_json::to_vec(&session)?)?;
        Ok(1)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db.get_pinned(b"__ping__")?;
        Ok(())
    }
}

#[async_trait]
impl PlaylistSeeder for DBLayer {
    async fn ensure_watch_later(&self, floatplane_user_id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let key = Self::watch_later_key(floatplane_user_id);
        if self.exists(&key)? {
            return Ok(());
        }
        let now = Utc::now();
        let playlist = json!({
            "floatplane_user_id": floatplane_user_id,
            "name": "Watch Later",
            "is_watch_later": true,
            "video_ids": [],
            "created_at": now,
            "updated_at": now,
        });
        self.db.put(key, serde_json::to_vec(&playlist)?)?;
        Ok(())
    }
}
