use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Algorithm of the key pair generated for each certificate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    #[display("rsa")]
    Rsa,
    #[display("ecdsa")]
    Ecdsa,
    #[display("ed25519")]
    Ed25519,
}

impl KeyType {
    /// Whether a configured key size influences generation.
    #[must_use]
    pub fn uses_key_size(self) -> bool {
        !matches!(self, Self::Ed25519)
    }
}

impl std::str::FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(Self::Rsa),
            "ecdsa" => Ok(Self::Ecdsa),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(Error::Config(format!(
                "unsupported key type '{other}' (expected rsa, ecdsa or ed25519)"
            ))),
        }
    }
}
