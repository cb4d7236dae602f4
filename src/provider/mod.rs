//! Identity providers used by the certificate authority to decide whether a
//! login may receive a certificate.
//!
//! Every provider implements [`Provider`]. The authority picks the concrete
//! implementation once, from configuration, via [`AnyProvider::from_config`]:
//!
//! ```rust,ignore
//! use certgate::provider::{AnyProvider, GoogleConfig, Provider, ProviderConfig};
//!
//! let config = GoogleConfig::new("client-id", "secret", "https://ca.example.com/auth/callback".parse()?)
//!     .with_domain("example.com");
//! let provider = AnyProvider::from_config(ProviderConfig::Google(config))?;
//!
//! let session = provider.start_session(&certgate::generate_state());
//! // ... user completes the browser flow, the callback delivers `code` ...
//! let token = provider.exchange(&code).await?;
//! if provider.valid(&token).await {
//!     let user = provider.username(&token).await;
//! }
//! ```

#[cfg(feature = "google")]
mod google;
mod test_provider;

use std::future::Future;

use serde::Deserialize;

use crate::error::Error;
use crate::session::Session;
use crate::token::IdentityToken;

#[cfg(feature = "google")]
pub use google::{GoogleConfig, GoogleProvider};
pub use test_provider::TestProvider;

/// Turns an external identity proof into a verified local username.
///
/// Implementations are immutable after construction and may be shared
/// across any number of concurrent logins.
pub trait Provider: Send + Sync {
    /// Stable identifier of the implementation. Diagnostics only.
    fn name(&self) -> &'static str;

    /// Builds the URL the user must visit, embedding `state` verbatim.
    ///
    /// Pure URL construction; no network access. Replayed `state` values are
    /// not detected.
    fn start_session(&self, state: &str) -> Session;

    /// Converts a one-time authorization code into a token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exchange`] if the code is invalid or expired, or the
    /// provider cannot be reached. Not retried; restart the session instead.
    fn exchange(&self, code: &str) -> impl Future<Output = Result<IdentityToken, Error>> + Send;

    /// The trust decision. Any failure, including network errors while
    /// checking the token, yields `false`.
    fn valid(&self, token: &IdentityToken) -> impl Future<Output = bool> + Send;

    /// Best-effort remote revocation. Certificates already issued are
    /// unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Revocation`] when the revocation call fails.
    fn revoke(&self, token: &IdentityToken) -> impl Future<Output = Result<(), Error>> + Send;

    /// Local identity for the token, or an empty string when it cannot be
    /// resolved. Callers must treat the empty string as unauthorized.
    fn username(&self, token: &IdentityToken) -> impl Future<Output = String> + Send;
}

/// Provider selection as written in the authority's configuration.
///
/// ```toml
/// provider = "google"
/// client_id = "..."
/// client_secret = "..."
/// redirect_uri = "https://ca.example.com/auth/callback"
/// domain = "example.com"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider")]
#[non_exhaustive]
pub enum ProviderConfig {
    #[cfg(feature = "google")]
    #[serde(rename = "google")]
    Google(GoogleConfig),
    #[serde(rename = "testprovider")]
    Test,
}

/// Provider chosen from configuration at construction time.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyProvider {
    #[cfg(feature = "google")]
    Google(GoogleProvider),
    Test(TestProvider),
}

impl AnyProvider {
    /// Construct the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the selected provider rejects its settings.
    pub fn from_config(config: ProviderConfig) -> Result<Self, Error> {
        let provider = match config {
            #[cfg(feature = "google")]
            ProviderConfig::Google(config) => Self::Google(GoogleProvider::new(config)?),
            ProviderConfig::Test => Self::Test(TestProvider::new()),
        };
        tracing::info!(provider = provider.name(), "Identity provider configured");
        Ok(provider)
    }
}

impl Provider for AnyProvider {
    fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "google")]
            Self::Google(p) => p.name(),
            Self::Test(p) => p.name(),
        }
    }

    fn start_session(&self, state: &str) -> Session {
        match self {
            #[cfg(feature = "google")]
            Self::Google(p) => p.start_session(state),
            Self::Test(p) => p.start_session(state),
        }
    }

    async fn exchange(&self, code: &str) -> Result<IdentityToken, Error> {
        match self {
            #[cfg(feature = "google")]
            Self::Google(p) => p.exchange(code).await,
            Self::Test(p) => p.exchange(code).await,
        }
    }

    async fn valid(&self, token: &IdentityToken) -> bool {
        match self {
            #[cfg(feature = "google")]
            Self::Google(p) => p.valid(token).await,
            Self::Test(p) => p.valid(token).await,
        }
    }

    async fn revoke(&self, token: &IdentityToken) -> Result<(), Error> {
        match self {
            #[cfg(feature = "google")]
            Self::Google(p) => p.revoke(token).await,
            Self::Test(p) => p.revoke(token).await,
        }
    }

    async fn username(&self, token: &IdentityToken) -> String {
        match self {
            #[cfg(feature = "google")]
            Self::Google(p) => p.username(token).await,
            Self::Test(p) => p.username(token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_test_provider() {
        let config: ProviderConfig = toml::from_str(r#"provider = "testprovider""#).unwrap();
        let provider = AnyProvider::from_config(config).unwrap();
        assert_eq!(provider.name(), "testprovider");
    }

    #[cfg(feature = "google")]
    #[test]
    fn test_deserialize_google_provider() {
        let config: ProviderConfig = toml::from_str(
            r#"
            provider = "google"
            client_id = "id"
            client_secret = "secret"
            redirect_uri = "https://ca.example.com/auth/callback"
            domain = "example.com"
            "#,
        )
        .unwrap();
        let provider = AnyProvider::from_config(config).unwrap();
        assert_eq!(provider.name(), "google");
    }

    #[cfg(feature = "google")]
    #[test]
    fn test_google_without_domain_or_whitelist_is_config_error() {
        let config: ProviderConfig = toml::from_str(
            r#"
            provider = "google"
            client_id = "id"
            client_secret = "secret"
            redirect_uri = "https://ca.example.com/auth/callback"
            "#,
        )
        .unwrap();
        assert!(matches!(
            AnyProvider::from_config(config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_provider_rejected_by_parser() {
        assert!(toml::from_str::<ProviderConfig>(r#"provider = "github""#).is_err());
    }

    #[tokio::test]
    async fn test_any_provider_delegates_to_stub() {
        let provider = AnyProvider::from_config(ProviderConfig::Test).unwrap();
        let token = provider.exchange("code").await.unwrap();
        assert!(provider.valid(&token).await);
        assert_eq!(provider.username(&token).await, "test");
        assert!(provider.revoke(&token).await.is_ok());
    }
}
