use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use ssh_key::{Certificate, PublicKey};
use time::OffsetDateTime;
use url::Url;

use super::credentials::Credentials;
use crate::error::Error;

const STATUS_OK: &str = "ok";

/// Body of `POST /sign`.
#[derive(Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SignRequest {
    /// Public key in OpenSSH `authorized_keys` format.
    pub key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
}

/// Reply to `POST /sign`. On success `response` holds the certificate in
/// OpenSSH format; otherwise it carries the authority's error message.
#[derive(Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SignResponse {
    pub status: String,
    pub response: String,
}

impl SignResponse {
    #[must_use]
    pub fn ok(certificate: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.into(),
            response: certificate.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            response: message.into(),
        }
    }
}

/// HTTP client for the certificate authority's signing endpoint.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    sign_url: Url,
    http: reqwest::Client,
}

impl AuthorityClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `ca` cannot serve as a base URL, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(ca: &Url, validate_tls_certificate: bool) -> Result<Self, Error> {
        let sign_url = format!("{}/sign", ca.as_str().trim_end_matches('/'))
            .parse()
            .map_err(|e| Error::Config(format!("invalid CA address {ca}: {e}")))?;

        if !validate_tls_certificate {
            tracing::warn!(ca = %ca, "TLS certificate validation is disabled");
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!validate_tls_certificate)
            .build()?;

        Ok(Self { sign_url, http })
    }

    #[must_use]
    pub fn sign_url(&self) -> &Url {
        &self.sign_url
    }

    /// Ask the authority to sign `public_key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure and [`Error::Authority`]
    /// if the authority refuses or does not answer with a certificate.
    pub async fn sign(
        &self,
        public_key: &PublicKey,
        credentials: &Credentials,
        valid_until: OffsetDateTime,
    ) -> Result<Certificate, Error> {
        let request = SignRequest {
            key: public_key.to_openssh()?,
            valid_until,
        };

        tracing::debug!(url = %self.sign_url, valid_until = %valid_until, "Requesting certificate");
        let response = self
            .http
            .post(self.sign_url.clone())
            .header(AUTHORIZATION, credentials.header_value())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authority(format!(
                "bad response from server: {status} {}",
                body.trim()
            )));
        }

        let reply: SignResponse = response
            .json()
            .await
            .map_err(|e| Error::Authority(format!("malformed signing response: {e}")))?;
        if reply.status != STATUS_OK {
            return Err(Error::Authority(reply.response));
        }

        Certificate::from_openssh(reply.response.trim()).map_err(|e| {
            Error::Authority(format!("did not receive a certificate from server: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_url_appends_path() {
        let client = AuthorityClient::new(&"http://localhost:10000".parse().unwrap(), true).unwrap();
        assert_eq!(client.sign_url().as_str(), "http://localhost:10000/sign");

        let client =
            AuthorityClient::new(&"https://ca.example.com/cashier/".parse().unwrap(), false)
                .unwrap();
        assert_eq!(client.sign_url().as_str(), "https://ca.example.com/cashier/sign");
    }

    #[test]
    fn test_sign_request_wire_format() {
        let request = SignRequest {
            key: "ssh-ed25519 AAAA".into(),
            valid_until: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["key"], "ssh-ed25519 AAAA");
        assert_eq!(json["valid_until"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_sign_response_constructors() {
        assert_eq!(SignResponse::ok("cert").status, "ok");
        assert_eq!(SignResponse::error("nope").status, "error");
    }
}
