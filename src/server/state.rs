use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::store::GuardedGalleryStore;

pub type GuardedAuthManager = Arc<AuthManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub store: GuardedGalleryStore,
    pub auth: GuardedAuthManager,
}

impl ServerState {
    pub fn new(config: ServerConfig, store: GuardedGalleryStore) -> Self {
        let auth = Arc::new(AuthManager::new(&config, store.clone()));
        Self {
            config,
            store,
            auth,
        }
    }
}

impl FromRef<ServerState> for GuardedGalleryStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedAuthManager {
    fn from_ref(input: &ServerState) -> Self {
        input.auth.clone()
    }
}
