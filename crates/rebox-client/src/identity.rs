//! OAuth code exchange.
//!
//! The client never sees provider tokens: it hands the authorization code to
//! an exchange endpoint and receives an opaque authenticated-user record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// The user record returned by a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange `code` issued by `provider` for the signed-in user.
    async fn exchange_code(&self, provider: &str, code: &str) -> Result<ProviderProfile>;
}

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    provider: &'a str,
    code: &'a str,
}

/// Posts `{provider, code}` as JSON to a configured endpoint.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    exchange_url: String,
}

impl HttpIdentityProvider {
    pub fn new(exchange_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            exchange_url: exchange_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(&self, provider: &str, code: &str) -> Result<ProviderProfile> {
        tracing::debug!(provider, url = %self.exchange_url, "exchanging authorization code");

        let resp = self
            .client
            .post(&self.exchange_url)
            .json(&ExchangeRequest { provider, code })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ServiceError::Identity(format!(
                "code exchange failed with status {}",
                resp.status()
            )));
        }

        let profile: ProviderProfile = resp.json().await?;
        if profile.id.is_empty() {
            return Err(ServiceError::Identity("exchange returned no user id".into()));
        }
        Ok(profile)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// Accepts exactly one code and returns a fixed profile for it.
    pub struct StaticProvider {
        pub code: String,
        pub profile: ProviderProfile,
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn exchange_code(&self, _provider: &str, code: &str) -> Result<ProviderProfile> {
            if code == self.code {
                Ok(self.profile.clone())
            } else {
                Err(ServiceError::Unauthorized("invalid authorization code".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_decodes_with_missing_optionals() {
        let profile: ProviderProfile = serde_json::from_str(r#"{"id": "g-123"}"#).unwrap();
        assert_eq!(profile.id, "g-123");
        assert!(profile.email.is_none());

        let full: ProviderProfile = serde_json::from_str(
            r#"{"id": "g-1", "email": "a@b.co", "name": "Ana", "photoUrl": "https://p"}"#,
        )
        .unwrap();
        assert_eq!(full.photo_url.as_deref(), Some("https://p"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_identity_error() {
        let provider = HttpIdentityProvider::new("http://127.0.0.1:1/exchange");
        let err = provider.exchange_code("google", "abc").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Identity);
    }
}
