use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use time::OffsetDateTime;
use url::Url;

use crate::error::Error;
use crate::types::KeyType;

const DEFAULT_CA: &str = "http://localhost:10000";
const DEFAULT_KEY_SIZE: u32 = 2048;
const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for one certificate request.
///
/// Loaded from a TOML file with [`load`](ClientConfig::load) and adjusted
/// with the `with_*` methods (the CLI applies its flags this way):
///
/// ```toml
/// ca = "https://ca.example.com"
/// key_type = "ed25519"
/// validity = "12h"
/// public_file_prefix = "/home/alice/.ssh/id_certgate"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) ca: Url,
    pub(crate) key_type: KeyType,
    pub(crate) key_size: u32,
    #[serde(deserialize_with = "deserialize_validity")]
    pub(crate) validity: Duration,
    pub(crate) browser_auth: bool,
    pub(crate) public_file_prefix: Option<PathBuf>,
    pub(crate) validate_tls_certificate: bool,
    pub(crate) agent_socket: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ca: DEFAULT_CA.parse().expect("valid default URL"),
            key_type: KeyType::default(),
            key_size: DEFAULT_KEY_SIZE,
            validity: DEFAULT_VALIDITY,
            browser_auth: true,
            public_file_prefix: None,
            validate_tls_certificate: true,
            agent_socket: None,
        }
    }
}

impl ClientConfig {
    /// Read a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Config`]
    /// if it is not valid.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), except for a missing file.
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        match Self::load(path) {
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    #[must_use]
    pub fn with_ca(mut self, ca: Url) -> Self {
        self.ca = ca;
        self
    }

    #[must_use]
    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    #[must_use]
    pub fn with_key_size(mut self, key_size: u32) -> Self {
        self.key_size = key_size;
        self
    }

    #[must_use]
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    #[must_use]
    pub fn with_browser_auth(mut self, browser_auth: bool) -> Self {
        self.browser_auth = browser_auth;
        self
    }

    #[must_use]
    pub fn with_public_file_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.public_file_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_validate_tls_certificate(mut self, validate: bool) -> Self {
        self.validate_tls_certificate = validate;
        self
    }

    #[must_use]
    pub fn with_agent_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.agent_socket = Some(socket.into());
        self
    }

    /// Certificate authority base URL.
    #[must_use]
    pub fn ca(&self) -> &Url {
        &self.ca
    }

    #[must_use]
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Key size; meaningless for `ed25519`.
    #[must_use]
    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    /// Requested certificate lifetime.
    #[must_use]
    pub fn validity(&self) -> Duration {
        self.validity
    }

    #[must_use]
    pub fn browser_auth(&self) -> bool {
        self.browser_auth
    }

    #[must_use]
    pub fn public_file_prefix(&self) -> Option<&Path> {
        self.public_file_prefix.as_deref()
    }

    #[must_use]
    pub fn validate_tls_certificate(&self) -> bool {
        self.validate_tls_certificate
    }

    #[must_use]
    pub fn agent_socket(&self) -> Option<&Path> {
        self.agent_socket.as_deref()
    }
}

/// Parses durations such as `24h`, `90m`, `1h30m`, `3600s` or `7d`.
///
/// # Errors
///
/// Returns [`Error::Config`] for malformed or zero durations, and for
/// durations whose end would fall outside the representable date range.
pub fn parse_validity(s: &str) -> Result<Duration, Error> {
    let invalid = || Error::Config(format!("invalid validity '{s}' (expected e.g. 24h, 1h30m)"));

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit: u64 = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(invalid()),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
        digits.clear();
    }

    if !digits.is_empty() || total == 0 {
        return Err(invalid());
    }
    let validity = Duration::from_secs(total);
    if expiry_after(validity).is_none() {
        return Err(Error::Config(format!("validity '{s}' is too long")));
    }
    Ok(validity)
}

/// The moment `validity` from now, if it can be represented.
pub(crate) fn expiry_after(validity: Duration) -> Option<OffsetDateTime> {
    let validity = time::Duration::try_from(validity).ok()?;
    OffsetDateTime::now_utc().checked_add(validity)
}

fn deserialize_validity<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_validity(&raw).map_err(serde::de::Error::custom)
}
