use std::collections::HashSet;

use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use url::Url;

use super::Provider;
use crate::error::Error;
use crate::session::Session;
use crate::token::IdentityToken;

const NAME: &str = "google";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

fn default_auth_url() -> Url {
    "https://accounts.google.com/o/oauth2/auth"
        .parse()
        .expect("valid default URL")
}

fn default_token_url() -> Url {
    "https://oauth2.googleapis.com/token"
        .parse()
        .expect("valid default URL")
}

fn default_tokeninfo_url() -> Url {
    "https://www.googleapis.com/oauth2/v2/tokeninfo"
        .parse()
        .expect("valid default URL")
}

fn default_userinfo_url() -> Url {
    "https://www.googleapis.com/oauth2/v2/userinfo"
        .parse()
        .expect("valid default URL")
}

fn default_revoke_url() -> Url {
    "https://accounts.google.com/o/oauth2/revoke"
        .parse()
        .expect("valid default URL")
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/userinfo.email".into(),
        "https://www.googleapis.com/auth/userinfo.profile".into(),
    ]
}

/// Google `OAuth2` provider configuration.
///
/// Required fields are constructor parameters. A domain restriction or a
/// user whitelist must also be set before [`GoogleProvider::new`] accepts it.
///
/// ```rust,ignore
/// let config = GoogleConfig::new("client-id", "secret", "https://ca.example.com/auth/callback".parse()?)
///     .with_users_whitelist(["alice@example.com"]);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct GoogleConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    #[serde(default = "default_scopes")]
    pub(crate) scopes: Vec<String>,
    #[serde(default)]
    pub(crate) domain: Option<String>,
    #[serde(default)]
    pub(crate) users_whitelist: Vec<String>,
    #[serde(default = "default_auth_url")]
    pub(crate) auth_url: Url,
    #[serde(default = "default_token_url")]
    pub(crate) token_url: Url,
    #[serde(default = "default_tokeninfo_url")]
    pub(crate) tokeninfo_url: Url,
    #[serde(default = "default_userinfo_url")]
    pub(crate) userinfo_url: Url,
    #[serde(default = "default_revoke_url")]
    pub(crate) revoke_url: Url,
}

impl GoogleConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            scopes: default_scopes(),
            domain: None,
            users_whitelist: Vec::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            tokeninfo_url: default_tokeninfo_url(),
            userinfo_url: default_userinfo_url(),
            revoke_url: default_revoke_url(),
        }
    }

    /// Restrict logins to one hosted (Google Workspace) domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restrict logins to the listed email addresses.
    #[must_use]
    pub fn with_users_whitelist<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users_whitelist = users.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_tokeninfo_url(mut self, url: Url) -> Self {
        self.tokeninfo_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    #[must_use]
    pub fn with_revoke_url(mut self, url: Url) -> Self {
        self.revoke_url = url;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    audience: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    verified_email: Option<bool>,
    /// Hosted domain; absent for consumer accounts.
    #[serde(default)]
    hd: Option<String>,
}

impl UserInfo {
    /// Email address, unless the provider says it is unverified.
    fn verified_email(&self) -> Option<&str> {
        match self.verified_email {
            Some(false) => None,
            _ => self.email.as_deref().filter(|e| !e.is_empty()),
        }
    }
}

/// Provider backed by Google `OAuth2` and its token-introspection and
/// userinfo endpoints.
#[derive(Debug)]
pub struct GoogleProvider {
    config: GoogleConfig,
    whitelist: HashSet<String>,
    http: reqwest::Client,
}

impl GoogleProvider {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when neither a domain nor a non-empty user
    /// whitelist is configured, or the client id is empty.
    pub fn new(config: GoogleConfig) -> Result<Self, Error> {
        let whitelist: HashSet<String> = config
            .users_whitelist
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let has_domain = config.domain.as_deref().is_some_and(|d| !d.is_empty());

        if !has_domain && whitelist.is_empty() {
            return Err(Error::Config(
                "either a Google Workspace domain or a users whitelist must be specified".into(),
            ));
        }
        if config.client_id.is_empty() {
            return Err(Error::Config("client_id is required".into()));
        }

        Ok(Self {
            config,
            whitelist,
            http: reqwest::Client::new(),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn domain(&self) -> Option<&str> {
        self.config.domain.as_deref().filter(|d| !d.is_empty())
    }

    /// Membership is by full verified email address.
    fn whitelisted(&self, info: &UserInfo) -> bool {
        info.verified_email().is_some_and(|email| self.whitelist.contains(email))
    }

    async fn user_info(&self, token: &IdentityToken) -> Result<UserInfo, String> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let response = ensure_success(response, "userinfo request").await?;
        response.json::<UserInfo>().await.map_err(|e| e.to_string())
    }

    async fn token_info(&self, token: &IdentityToken) -> Result<TokenInfo, String> {
        let response = self
            .http
            .get(self.config.tokeninfo_url.clone())
            .query(&[("access_token", token.access_token.as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let response = ensure_success(response, "tokeninfo request").await?;
        response.json::<TokenInfo>().await.map_err(|e| e.to_string())
    }
}

impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start_session(&self, state: &str) -> Session {
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("scope", &scope)
                .append_pair("state", state);
            if let Some(domain) = self.domain() {
                query.append_pair("hd", domain);
            }
        }

        Session::new(url, state)
    }

    async fn exchange(&self, code: &str) -> Result<IdentityToken, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Exchange {
                detail: e.to_string(),
            })?;

        let response = ensure_success(response, "token exchange")
            .await
            .map_err(|detail| Error::Exchange { detail })?;
        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::Exchange {
                detail: format!("malformed token response: {e}"),
            })?;

        let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expiry = OffsetDateTime::now_utc()
            .checked_add(Duration::seconds(lifetime))
            .ok_or_else(|| Error::Exchange {
                detail: format!("expires_in out of range: {lifetime}"),
            })?;
        Ok(IdentityToken::new(body.access_token, expiry))
    }

    async fn valid(&self, token: &IdentityToken) -> bool {
        if !token.is_unexpired() {
            tracing::debug!(expiry = %token.expiry, "Rejecting expired token");
            return false;
        }

        let mut user_info = None;
        if !self.whitelist.is_empty() {
            let info = match self.user_info(token).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(error = %e, "Userinfo lookup failed; rejecting token");
                    return false;
                }
            };
            if !self.whitelisted(&info) {
                tracing::warn!(email = ?info.email, "User is not whitelisted");
                return false;
            }
            user_info = Some(info);
        }

        match self.token_info(token).await {
            Ok(info) if info.audience.as_deref() == Some(self.config.client_id.as_str()) => {}
            Ok(info) => {
                tracing::warn!(audience = ?info.audience, "Token issued for another client");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token introspection failed; rejecting token");
                return false;
            }
        }

        if let Some(domain) = self.domain() {
            let info = match user_info {
                Some(info) => info,
                None => match self.user_info(token).await {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::warn!(error = %e, "Userinfo lookup failed; rejecting token");
                        return false;
                    }
                },
            };
            if info.hd.as_deref() != Some(domain) {
                tracing::warn!(hd = ?info.hd, domain, "Token belongs to another domain");
                return false;
            }
        }

        true
    }

    async fn revoke(&self, token: &IdentityToken) -> Result<(), Error> {
        let response = self
            .http
            .get(self.config.revoke_url.clone())
            .query(&[("token", token.access_token.as_str())])
            .send()
            .await
            .map_err(|e| Error::Revocation(e.to_string()))?;
        ensure_success(response, "token revocation")
            .await
            .map_err(Error::Revocation)?;
        Ok(())
    }

    async fn username(&self, token: &IdentityToken) -> String {
        match self.user_info(token).await {
            Ok(info) => info.verified_email().map(local_part).unwrap_or_default().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not resolve username");
                String::new()
            }
        }
    }
}

/// Text before the first `@`.
fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

/// Checks HTTP response status; returns the response on success or a
/// description of the failure.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(format!("{operation} returned {status}: {body}"))
}
