//! Account lifecycle: email/password, anonymous and provider sign-in.
//!
//! The signed-in user is kept under [`CURRENT_USER_KEY`] in the store and
//! mirrored on a `watch` channel so observers see every auth change.

use std::sync::Arc;

use chrono::Utc;
use rebox_shared::constants::{CURRENT_USER_KEY, DEFAULT_ANONYMOUS_NAME};
use rebox_shared::crypto::{hash_password, verify_password};
use rebox_shared::validation::{
    validate_display_name, validate_email, validate_password, validate_photo_url,
};
use rebox_shared::generate_id;
use rebox_store::{Filter, Patch, Store, StoreError, StoredUser, User};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use super::{timestamp_value, tolerate_missing};
use crate::error::{Result, ServiceError};
use crate::identity::{IdentityProvider, ProviderProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Fields a user may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService<S> {
    store: Arc<S>,
    identity: Option<Arc<dyn IdentityProvider>>,
    state: watch::Sender<Option<User>>,
}

impl<S: Store> AuthService<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            store,
            identity: None,
            state,
        }
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Observe sign-in / sign-out. The current value is the signed-in user.
    pub fn has_identity_provider(&self) -> bool {
        self.identity.is_some()
    }

    pub fn on_auth_state_change(&self) -> watch::Receiver<Option<User>> {
        self.state.subscribe()
    }

    pub async fn get_current_user(&self) -> Result<Option<User>> {
        Ok(self.store.get(CURRENT_USER_KEY).await?)
    }

    /// Load the persisted user and announce it to observers.
    pub async fn restore(&self) -> Result<Option<User>> {
        let user = self.get_current_user().await?;
        self.state.send_replace(user.clone());
        Ok(user)
    }

    async fn sign_in(&self, user: User) -> Result<User> {
        self.store.set(CURRENT_USER_KEY, &user).await?;
        self.state.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        let mut found: Vec<StoredUser> = self
            .store
            .find_where(&Filter::new().eq("email", email))
            .await?;
        Ok(found.pop())
    }

    pub async fn register(&self, data: RegisterData) -> Result<User> {
        let email = normalize_email(&data.email);
        validate_email(&email)?;
        validate_password(&data.password)?;
        validate_display_name(&data.name)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("Email already registered".into()));
        }

        let now = Utc::now();
        let stored = StoredUser {
            user: User {
                id: generate_id(),
                email: Some(email),
                name: data.name.trim().to_string(),
                photo_url: None,
                is_anonymous: false,
                created_at: now,
                updated_at: now,
            },
            password_hash: Some(hash_password(&data.password)),
        };

        match self.store.append(&stored).await {
            Err(e) if e.is_conflict() => {
                return Err(ServiceError::Conflict("Email already registered".into()))
            }
            other => other?,
        }

        info!(user_id = %stored.user.id, "user registered");
        self.sign_in(stored.into_user()).await
    }

    pub async fn login(&self, credentials: LoginCredentials) -> Result<User> {
        let email = normalize_email(&credentials.email);
        let stored = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("user", email.clone()))?;

        let valid = stored
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(&credentials.password, hash));
        if !valid {
            return Err(ServiceError::Unauthorized("Incorrect password".into()));
        }

        info!(user_id = %stored.user.id, "user logged in");
        self.sign_in(stored.into_user()).await
    }

    pub async fn login_anonymously(&self, name: &str) -> Result<User> {
        let name = match name.trim() {
            "" => DEFAULT_ANONYMOUS_NAME.to_string(),
            given => {
                validate_display_name(given)?;
                given.to_string()
            }
        };

        let now = Utc::now();
        let stored = StoredUser {
            user: User {
                id: generate_id(),
                email: None,
                name,
                photo_url: None,
                is_anonymous: true,
                created_at: now,
                updated_at: now,
            },
            password_hash: None,
        };
        self.store.append(&stored).await?;

        info!(user_id = %stored.user.id, "anonymous user created");
        self.sign_in(stored.into_user()).await
    }

    /// Complete an OAuth flow: exchange the code, then create or refresh the
    /// user record keyed by the provider's user id.
    pub async fn sign_in_with_provider(&self, provider: &str, code: &str) -> Result<User> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| ServiceError::Identity("no identity provider configured".into()))?;
        let profile = identity.exchange_code(provider, code).await?;

        let user = self.upsert_provider_user(profile).await?;
        info!(user_id = %user.id, provider, "signed in with provider");
        self.sign_in(user).await
    }

    async fn upsert_provider_user(&self, profile: ProviderProfile) -> Result<User> {
        let now = Utc::now();
        let email = profile.email.as_deref().map(normalize_email);

        if let Some(existing) = self.store.find_one::<StoredUser>(&profile.id).await? {
            let mut user = existing.into_user();
            let mut patch = Patch::new().set("updatedAt", timestamp_value(&now));
            if let Some(name) = profile.name.filter(|n| !n.trim().is_empty()) {
                patch = patch.set("name", name.clone());
                user.name = name;
            }
            if let Some(photo) = profile.photo_url {
                patch = patch.set("photoUrl", photo.clone());
                user.photo_url = Some(photo);
            }
            if let Some(email) = email {
                patch = patch.set("email", email.clone());
                user.email = Some(email);
            }
            user.updated_at = now;

            match self.store.update_where::<StoredUser>(&user.id, patch).await {
                Err(StoreError::Conflict { .. }) => {
                    return Err(ServiceError::Conflict("Email already registered".into()))
                }
                result => tolerate_missing(result, "users", &user.id)?,
            }
            return Ok(user);
        }

        let fallback_name = email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or(DEFAULT_ANONYMOUS_NAME)
            .to_string();
        let stored = StoredUser {
            user: User {
                id: profile.id,
                email,
                name: profile
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(fallback_name),
                photo_url: profile.photo_url,
                is_anonymous: false,
                created_at: now,
                updated_at: now,
            },
            password_hash: None,
        };

        match self.store.append(&stored).await {
            Err(e) if e.is_conflict() => {
                Err(ServiceError::Conflict("Email already registered".into()))
            }
            other => {
                other?;
                Ok(stored.into_user())
            }
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.store.remove(CURRENT_USER_KEY).await?;
        self.state.send_replace(None);
        info!("user logged out");
        Ok(())
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User> {
        let current = self
            .get_current_user()
            .await?
            .ok_or(ServiceError::NotAuthenticated)?;
        if current.id != user_id {
            return Err(ServiceError::Forbidden(
                "Cannot update another user's profile".into(),
            ));
        }

        if let Some(name) = &update.name {
            validate_display_name(name)?;
        }
        if let Some(photo) = &update.photo_url {
            validate_photo_url(photo)?;
        }

        let now = Utc::now();
        let mut patch = Patch::new().set("updatedAt", timestamp_value(&now));
        let mut user = current;
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            patch = patch.set("name", name.clone());
            user.name = name;
        }
        if let Some(photo) = update.photo_url {
            patch = patch.set("photoUrl", photo.clone());
            user.photo_url = Some(photo);
        }
        user.updated_at = now;

        let result = self.store.update_where::<StoredUser>(user_id, patch).await;
        tolerate_missing(result, "users", user_id)?;

        self.sign_in(user).await
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .store
            .find_one::<StoredUser>(user_id)
            .await?
            .map(StoredUser::into_user))
    }
}
