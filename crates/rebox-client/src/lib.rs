//! # rebox-client
//!
//! Application layer of the ReBox item-swap marketplace: authentication,
//! item listings, swiping, matching and per-match chat. Everything here runs
//! against any [`rebox_store::Store`] backend, chosen at startup from
//! [`ReboxConfig`].

pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod seed;
pub mod services;
pub mod session;
pub mod subscriptions;

pub use backend::{identity_provider, open_session, open_store, OpenedStore};
pub use config::ReboxConfig;
pub use error::{ErrorKind, Result, ServiceError};
pub use identity::{HttpIdentityProvider, IdentityProvider, ProviderProfile};
pub use seed::{seed_demo_data, SeedReport};
pub use services::{
    AuthService, ItemService, ItemUpdate, LoginCredentials, MatchService, NewItem, ProfileUpdate,
    RegisterData,
};
pub use session::{Session, SessionState};
pub use subscriptions::Subscription;

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "rebox_client=debug,rebox_store=info,warn";

/// Install the global fmt subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
