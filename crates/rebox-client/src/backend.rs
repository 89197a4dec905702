//! Opens the persistence backend chosen by [`ReboxConfig::backend`].
//!
//! `Store` is generic, so the choice is handed back as an enum and callers
//! dispatch once into code that is generic over `S: Store`.

use std::sync::Arc;

use rebox_shared::Backend;
use rebox_store::{Database, LocalStore, Store, StoreError};
use tracing::info;

use crate::config::ReboxConfig;
use crate::identity::{HttpIdentityProvider, IdentityProvider};
use crate::session::Session;

pub enum OpenedStore {
    Local(LocalStore),
    Remote(Database),
}

impl OpenedStore {
    pub fn backend(&self) -> Backend {
        match self {
            OpenedStore::Local(_) => Backend::Local,
            OpenedStore::Remote(_) => Backend::Remote,
        }
    }
}

pub async fn open_store(config: &ReboxConfig) -> Result<OpenedStore, StoreError> {
    match config.backend {
        Backend::Local => {
            let store = match config.local_store_path() {
                Some(path) => {
                    info!(path = %path.display(), "opening local store");
                    LocalStore::open(path).await?
                }
                None => {
                    info!("using in-memory local store");
                    LocalStore::in_memory()
                }
            };
            Ok(OpenedStore::Local(store))
        }
        Backend::Remote => {
            let db = match config.database_path() {
                Some(path) => {
                    info!(path = %path.display(), "opening database");
                    Database::open_at(&path)?
                }
                None => {
                    info!("using in-memory database");
                    Database::open_in_memory()?
                }
            };
            Ok(OpenedStore::Remote(
                db.with_realtime_capacity(config.realtime_capacity),
            ))
        }
    }
}

/// The OAuth code exchange configured by `REBOX_OAUTH_EXCHANGE_URL`, if any.
pub fn identity_provider(config: &ReboxConfig) -> Option<Arc<dyn IdentityProvider>> {
    let url = config.oauth_exchange_url.as_deref()?;
    info!(url, "provider sign-in enabled");
    Some(Arc::new(HttpIdentityProvider::new(url)))
}

/// Wrap an opened store in a [`Session`] wired to the configured collaborators.
pub fn open_session<S: Store>(store: S, config: &ReboxConfig) -> Session<S> {
    let session = Session::new(Arc::new(store));
    match identity_provider(config) {
        Some(provider) => session.with_identity_provider(provider),
        None => session,
    }
}
