#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing settings, detected when a component is constructed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The authorization code could not be turned into a token.
    #[error("Token exchange failed: {detail}")]
    Exchange { detail: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token revocation failed: {0}")]
    Revocation(String),

    /// The user did not supply usable credentials.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// The certificate authority refused or garbled the signing request.
    #[error("Certificate authority error: {0}")]
    Authority(String),

    #[error("SSH agent error: {0}")]
    Agent(String),

    #[error("Key error: {0}")]
    Key(#[from] ssh_key::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ssh_encoding::Error> for Error {
    fn from(e: ssh_encoding::Error) -> Self {
        Self::Agent(e.to_string())
    }
}
