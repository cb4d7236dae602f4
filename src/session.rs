use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Start of an interactive login: the URL the user must visit and the
/// anti-forgery value the callback must echo back.
///
/// Nothing here rejects a replayed `state`; callers that need single-use
/// semantics must track consumed values themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Session {
    pub auth_url: String,
    pub state: String,
}

impl Session {
    #[must_use]
    pub fn new(auth_url: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            state: state.into(),
        }
    }
}

/// Generates a cryptographically random anti-forgery state value.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_state_carries_128_bits() {
        let decoded = URL_SAFE_NO_PAD.decode(generate_state()).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_state_survives_callback_query() {
        let state = generate_state();
        let mut url = url::Url::parse("https://ca.example.com/auth/callback").unwrap();
        url.query_pairs_mut().append_pair("state", &state);

        // no percent-encoding needed, so the value reads back verbatim
        assert!(url.as_str().ends_with(&format!("state={state}")));
        let echoed = url.query_pairs().find(|(k, _)| k == "state").unwrap().1;
        assert_eq!(echoed, state);
    }

    #[test]
    fn test_each_login_gets_fresh_state() {
        let states: HashSet<String> = (0..64).map(|_| generate_state()).collect();
        assert_eq!(states.len(), 64);
    }
}
