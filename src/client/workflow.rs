use std::time::Duration;

use derive_more::Display;
use ssh_key::{Certificate, PrivateKey};
use time::OffsetDateTime;

use super::agent::{Agent, AgentConnector, AgentIdentity};
use super::artifacts::{SavedFiles, save_public_files};
use super::config::{ClientConfig, expiry_after};
use super::credentials::{AuthMode, CredentialAcquirer, Prompt};
use super::sign::AuthorityClient;
use crate::error::Error;
use crate::keys::generate_key;

/// Progress of a [`SigningWorkflow`]. States only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum WorkflowState {
    Init,
    CredentialsObtained,
    KeysGenerated,
    CertificateSigned,
    CertificateInstalled,
    ArtifactsSaved,
    Done,
}

impl WorkflowState {
    /// What the workflow does to leave this state.
    #[must_use]
    pub fn next_step(self) -> &'static str {
        match self {
            Self::Init => "obtaining credentials",
            Self::CredentialsObtained => "generating key pair",
            Self::KeysGenerated => "requesting certificate",
            Self::CertificateSigned => "installing certificate into agent",
            Self::CertificateInstalled => "saving public files",
            Self::ArtifactsSaved | Self::Done => "finishing",
        }
    }
}

/// A failed run. `reached` is the last state completed; nothing done up to
/// that point is undone.
#[derive(Debug, thiserror::Error)]
#[error("Error {}: {source}", .reached.next_step())]
pub struct WorkflowError {
    pub reached: WorkflowState,
    #[source]
    pub source: Error,
}

/// What a successful run produced.
#[derive(Debug)]
#[non_exhaustive]
pub struct SignedIdentity {
    pub key: PrivateKey,
    pub certificate: Certificate,
    pub saved: Option<SavedFiles>,
}

/// Credential entry through agent installation, strictly in order.
pub struct SigningWorkflow<P, C> {
    config: ClientConfig,
    credentials: CredentialAcquirer<P>,
    authority: AuthorityClient,
    connector: C,
    state: WorkflowState,
}

impl<P: Prompt, C: AgentConnector> SigningWorkflow<P, C> {
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a validity whose end cannot be
    /// represented, and [`Error::Config`] or [`Error::Http`] if the authority
    /// client cannot be set up from `config`.
    pub fn new(config: ClientConfig, prompt: P, connector: C) -> Result<Self, Error> {
        certificate_expiry(config.validity())?;
        let mode = if config.browser_auth() {
            AuthMode::Browser
        } else {
            AuthMode::Password
        };
        let authority = AuthorityClient::new(config.ca(), config.validate_tls_certificate())?;
        let credentials = CredentialAcquirer::new(mode, config.ca().clone(), prompt);

        Ok(Self {
            config,
            credentials,
            authority,
            connector,
            state: WorkflowState::Init,
        })
    }

    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Run every step. The first failure aborts the run.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkflowError`] naming the last completed state.
    pub async fn run(mut self) -> Result<SignedIdentity, WorkflowError> {
        tracing::debug!(mode = ?self.credentials.mode(), "Obtaining credentials");
        let credentials = self.credentials.obtain().map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::CredentialsObtained);

        self.credentials
            .prompt_mut()
            .notify("Generating new key pair");
        let key = generate_key(self.config.key_type(), self.config.key_size())
            .map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::KeysGenerated);

        let valid_until = certificate_expiry(self.config.validity()).map_err(|e| self.fail(e))?;
        let certificate = self
            .authority
            .sign(key.public_key(), &credentials, valid_until)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::CertificateSigned);

        self.install(&key, &certificate)
            .await
            .map_err(|e| self.fail(e))?;
        self.advance(WorkflowState::CertificateInstalled);

        let saved = match self.config.public_file_prefix() {
            Some(prefix) => Some(
                save_public_files(prefix, key.public_key(), &certificate)
                    .map_err(|e| self.fail(e))?,
            ),
            None => None,
        };
        self.advance(WorkflowState::ArtifactsSaved);

        self.credentials.prompt_mut().notify("Credentials added.");
        self.advance(WorkflowState::Done);

        Ok(SignedIdentity {
            key,
            certificate,
            saved,
        })
    }

    /// The agent connection lives only for this call.
    async fn install(&self, key: &PrivateKey, certificate: &Certificate) -> Result<(), Error> {
        let mut agent = self.connector.connect().await?;
        let identity = AgentIdentity::for_certificate(key, certificate);
        agent.add_identity(&identity).await?;
        tracing::info!(
            key_id = certificate.key_id(),
            serial = certificate.serial(),
            "Certificate loaded into agent"
        );
        Ok(())
    }

    fn advance(&mut self, next: WorkflowState) {
        tracing::debug!(from = %self.state, to = %next, "Signing workflow advanced");
        self.state = next;
    }

    fn fail(&self, source: Error) -> WorkflowError {
        tracing::debug!(reached = %self.state, error = %source, "Signing workflow aborted");
        WorkflowError {
            reached: self.state,
            source,
        }
    }
}

fn certificate_expiry(validity: Duration) -> Result<OffsetDateTime, Error> {
    expiry_after(validity).ok_or_else(|| {
        Error::Config(format!(
            "certificate validity of {}s ends beyond the representable date range",
            validity.as_secs()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered() {
        assert!(WorkflowState::Init < WorkflowState::CredentialsObtained);
        assert!(WorkflowState::CredentialsObtained < WorkflowState::KeysGenerated);
        assert!(WorkflowState::KeysGenerated < WorkflowState::CertificateSigned);
        assert!(WorkflowState::CertificateSigned < WorkflowState::CertificateInstalled);
        assert!(WorkflowState::ArtifactsSaved < WorkflowState::Done);
    }

    #[test]
    fn test_error_message_names_step() {
        let err = WorkflowError {
            reached: WorkflowState::KeysGenerated,
            source: Error::Authority("bad response from server: 403 Forbidden".into()),
        };
        assert_eq!(
            err.to_string(),
            "Error requesting certificate: Certificate authority error: bad response from server: 403 Forbidden"
        );
    }

    #[test]
    fn test_certificate_expiry_rejects_unrepresentable_validity() {
        assert!(certificate_expiry(Duration::from_secs(3600)).is_ok());
        assert!(matches!(
            certificate_expiry(Duration::from_secs(8_640_000_000_000_000)),
            Err(Error::Config(_))
        ));
    }
}
