use std::sync::Arc;

use crate::{
    auth::{gate::AuthGate, login::SessionBinder, qr::QrSessionManager, rotate::KeyRotator},
    config::Config,
    db::store::{IdentityStore, PlaylistSeeder},
};

/// Shared handles passed to every handler. The store is injected, never global.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub qr: Arc<QrSessionManager>,
    pub binder: Arc<SessionBinder>,
    pub gate: Arc<AuthGate>,
    pub rotator: Arc<KeyRotator>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        playlists: Arc<dyn PlaylistSeeder>,
        config: &Config,
    ) -> Self {
        let timeout = config.store_timeout;
        Self {
            qr: Arc::new(QrSessionManager::new(store.clone(), config.qr_ttl, timeout)),
            binder: Arc::new(SessionBinder::new(store.clone(), playlists, timeout)),
            gate: Arc::new(AuthGate::new(store.clone(), timeout)),
            rotator: Arc::new(KeyRotator::new(store.clone(), timeout)),
            store,
        }
    }
}
