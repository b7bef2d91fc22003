use crate::{
    config::AppConfig,
    services::{
        asset_service::AssetService,
        credential_store::CredentialStore,
        metadata_store::MetadataStore,
        object_store::{LocalObjectStore, ObjectStore},
        session_manager::SessionManager,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub assets: AssetService,
    pub sessions: Arc<SessionManager>,
    pub credentials: CredentialStore,
    /// Set when objects live on local disk, so `/objects/{*key}` can serve them.
    pub local_objects: Option<Arc<LocalObjectStore>>,
    pub revoke_on_logout: bool,
    pub cookie_secure: bool,
}

impl AppState {
    /// Wire the services over an open pool and a chosen object store backend.
    pub fn new(
        cfg: &AppConfig,
        db: Arc<SqlitePool>,
        objects: Arc<dyn ObjectStore>,
        local_objects: Option<Arc<LocalObjectStore>>,
    ) -> Self {
        let metadata = MetadataStore::new(db);
        Self {
            assets: AssetService::new(metadata.clone(), objects, cfg.orphan_policy),
            sessions: Arc::new(SessionManager::new(
                cfg.access_secret.expose(),
                cfg.refresh_secret.expose(),
            )),
            credentials: CredentialStore::new(metadata),
            local_objects,
            revoke_on_logout: cfg.revoke_on_logout,
            cookie_secure: cfg.cookie_secure,
        }
    }
}
