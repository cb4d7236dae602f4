use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Bearer credential issued by an identity provider.
///
/// Holding an unexpired token proves nothing on its own: authorization
/// requires [`Provider::valid`](crate::provider::Provider::valid).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct IdentityToken {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

impl IdentityToken {
    #[must_use]
    pub fn new(access_token: impl Into<String>, expiry: OffsetDateTime) -> Self {
        Self {
            access_token: access_token.into(),
            expiry,
        }
    }

    /// Token expiring `lifetime` from now.
    ///
    /// # Panics
    ///
    /// Panics if the expiry falls outside the representable date range.
    #[must_use]
    pub fn expiring_in(access_token: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(access_token, OffsetDateTime::now_utc() + lifetime)
    }

    /// `true` while the current time is strictly before the expiry.
    #[must_use]
    pub fn is_unexpired(&self) -> bool {
        self.is_unexpired_at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn is_unexpired_at(&self, now: OffsetDateTime) -> bool {
        now < self.expiry
    }
}

// Keep the bearer secret out of logs.
impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToken")
            .field("access_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpired_before_expiry() {
        let token = IdentityToken::expiring_in("t", Duration::hours(1));
        assert!(token.is_unexpired());
    }

    #[test]
    fn test_expired_at_exact_expiry() {
        let expiry = OffsetDateTime::now_utc();
        let token = IdentityToken::new("t", expiry);
        assert!(!token.is_unexpired_at(expiry));
        assert!(!token.is_unexpired_at(expiry + Duration::seconds(1)));
        assert!(token.is_unexpired_at(expiry - Duration::seconds(1)));
    }

    #[test]
    fn test_debug_redacts_access_token() {
        let token = IdentityToken::expiring_in("super-secret", Duration::minutes(5));
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_serde_roundtrip_keeps_expiry() {
        let token = IdentityToken::new(
            "abc",
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        let json = serde_json::to_string(&token).unwrap();
        assert!(json.contains("2023-11-14T22:13:20Z"));
        let parsed: IdentityToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
    }
}
