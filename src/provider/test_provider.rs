use time::Duration;

use super::Provider;
use crate::error::Error;
use crate::session::Session;
use crate::token::IdentityToken;

const NAME: &str = "testprovider";
const AUTH_URL: &str = "https://www.example.com/auth";

/// Provider that accepts everyone as user `test` without touching the network.
///
/// Meant for exercising the signing flow end to end; never configure it on a
/// real authority.
#[derive(Debug, Clone, Default)]
pub struct TestProvider;

impl TestProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Provider for TestProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start_session(&self, state: &str) -> Session {
        let mut url = url::Url::parse(AUTH_URL).expect("valid static URL");
        url.query_pairs_mut().append_pair("state", state);
        Session::new(url, state)
    }

    async fn exchange(&self, _code: &str) -> Result<IdentityToken, Error> {
        Ok(IdentityToken::expiring_in("token", Duration::hours(1)))
    }

    async fn valid(&self, _token: &IdentityToken) -> bool {
        true
    }

    async fn revoke(&self, _token: &IdentityToken) -> Result<(), Error> {
        Ok(())
    }

    async fn username(&self, _token: &IdentityToken) -> String {
        "test".into()
    }
}
