use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use super::keys;
use crate::{
    db::store::{within, IdentityStore},
    error::{AuthError, Result},
};

/// Which record held the rotated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotated {
    DeviceSession,
    /// Legacy per-user key; kept for clients issued before device sessions.
    LegacyUser,
    Nothing,
}

/// Logout: swaps the presented key for a fresh one nobody is told about.
pub struct KeyRotator {
    store: Arc<dyn IdentityStore>,
    timeout: Duration,
}

impl KeyRotator {
    pub fn new(store: Arc<dyn IdentityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn rotate(&self, current_key: &str) -> Result<Rotated> {
        let replacement = keys::new_api_key();

        let rows = within(
            self.timeout,
            self.store.replace_session_key(current_key, &replacement),
        )
        .await
        .map_err(|e| AuthError::from_store(e, "Failed to logout"))?;
        if rows > 0 {
            info!("device session key rotated");
            return Ok(Rotated::DeviceSession);
        }

        // Lost a race with another rotation, or the key is a legacy user key.
        let rows = within(
            self.timeout,
            self.store.replace_user_key(current_key, &replacement),
        )
        .await
        .map_err(|e| AuthError::from_store(e, "Failed to logout"))?;
        if rows > 0 {
            info!("legacy user key rotated");
            return Ok(Rotated::LegacyUser);
        }

        warn!("logout matched no key");
        Ok(Rotated::Nothing)
    }
}
