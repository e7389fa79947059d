use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{info, warn};

use super::{dpop::DpopBinder, keys, token::TokenValidator};
use crate::{
    db::store::{within, IdentityStore, PlaylistSeeder},
    error::{AuthError, BestEffort, Result},
    model::{device_session::DeviceSession, user::User},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub api_key: String,
    pub floatplane_user_id: String,
    pub is_new_user: bool,
}

/// Binds a DPoP-keyed device to an upstream identity and hands out its API key.
///
/// Lookups and inserts are independent store calls, so two first-time logins
/// can race; the loser gets [`AuthError::Conflict`] and may retry.
pub struct SessionBinder {
    store: Arc<dyn IdentityStore>,
    playlists: Arc<dyn PlaylistSeeder>,
    tokens: TokenValidator,
    dpop: DpopBinder,
    timeout: Duration,
}

impl SessionBinder {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        playlists: Arc<dyn PlaylistSeeder>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            playlists,
            tokens: TokenValidator,
            dpop: DpopBinder,
            timeout,
        }
    }

    pub async fn login(
        &self,
        access_token: &str,
        dpop_proof: &str,
        device_info: &str,
    ) -> Result<LoginOutcome> {
        if access_token.is_empty() || dpop_proof.is_empty() {
            return Err(AuthError::bad_request(
                "Missing access_token or dpop_proof",
            ));
        }

        // 1. device binding key
        let jkt = self.dpop.extract_thumbprint(dpop_proof).map_err(|e| {
            warn!(error = %e, "rejected DPoP proof");
            AuthError::bad_request("Invalid DPoP proof")
        })?;

        // 2. upstream identity
        let user_id = self.tokens.validate(access_token).map_err(|e| {
            warn!(error = %e, "rejected upstream access token");
            AuthError::unauthorized("Invalid Floatplane token")
        })?;

        // 3. user row
        let is_new_user = self.ensure_user(&user_id).await?;

        // 4. device session
        let api_key = match within(self.timeout, self.store.find_session_by_jkt(&jkt))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to load device session"))?
        {
            Some(session) => {
                if session.floatplane_user_id != user_id {
                    warn!(
                        session_id = %session.id,
                        bound_user = %session.floatplane_user_id,
                        login_user = %user_id,
                        "device key already bound to another user; reusing its session"
                    );
                }
                self.touch(&session.id).await;
                session.api_key
            }
            None => self.bind_device(&user_id, &jkt, device_info).await?,
        };

        info!(user_id = %user_id, is_new_user, "login succeeded");
        Ok(LoginOutcome {
            api_key,
            floatplane_user_id: user_id,
            is_new_user,
        })
    }

    async fn ensure_user(&self, user_id: &str) -> Result<bool> {
        let existing = within(self.timeout, self.store.find_user(user_id))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to load user"))?;
        if existing.is_some() {
            return Ok(false);
        }

        let user = User::new(user_id, keys::new_api_key(), Utc::now());
        within(self.timeout, self.store.insert_user(&user))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to create user"))?;
        info!(user_id = %user_id, "registered new user");

        self.seed_watch_later(user_id).await;
        Ok(true)
    }

    async fn bind_device(&self, user_id: &str, jkt: &str, device_info: &str) -> Result<String> {
        let now = Utc::now();
        let session = DeviceSession {
            id: keys::new_id(),
            floatplane_user_id: user_id.to_string(),
            api_key: keys::new_api_key(),
            dpop_jkt: jkt.to_string(),
            device_info: device_info.to_string(),
            created_at: now,
            last_accessed_at: now,
        };

        within(self.timeout, self.store.insert_session(&session))
            .await
            .map_err(|e| AuthError::from_store(e, "Failed to create device session"))?;
        info!(user_id = %user_id, session_id = %session.id, "bound new device");
        Ok(session.api_key)
    }

    async fn touch(&self, session_id: &str) -> BestEffort {
        BestEffort::observe(
            "touch_session",
            within(self.timeout, self.store.touch_session(session_id, Utc::now())).await,
        )
    }

    async fn seed_watch_later(&self, user_id: &str) -> BestEffort {
        BestEffort::observe(
            "ensure_watch_later",
            within(self.timeout, self.playlists.ensure_watch_later(user_id)).await,
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::auth::jose::test_support::compact;
    use serde_json::json;

    pub fn access_token(sub: &str) -> String {
        let exp = chrono::Utc::now().timestamp() + 3600;
        compact(&json!({"alg": "ES256", "typ": "at+jwt"}), &json!({"sub": sub, "exp": exp}))
    }

    pub fn dpop_proof(x: &str) -> String {
        compact(
            &json!({
                "typ": "dpop+jwt",
                "alg": "ES256",
                "jwk": {"kty": "EC", "crv": "P-256", "x": x, "y": "y-coordinate"}
            }),
            &json!({"htm": "POST", "htu": "/auth/login", "jti": x}),
        )
    }
}
