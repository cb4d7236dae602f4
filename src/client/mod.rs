//! Client side: obtain credentials, have a fresh key signed by the
//! certificate authority, and load the result into the SSH agent.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use certgate::client::{ClientConfig, SigningWorkflow, TerminalPrompt, UnixAgentConnector};
//!
//! let config = ClientConfig::load_or_default("~/.certgate.toml".as_ref())?;
//! let workflow = SigningWorkflow::new(config, TerminalPrompt, UnixAgentConnector::from_env()?)?;
//! let identity = workflow.run().await?;
//! ```

mod agent;
mod artifacts;
mod config;
mod credentials;
mod sign;
mod workflow;

pub use agent::{AUTH_SOCK_ENV, Agent, AgentConnector, AgentIdentity, UnixAgent, UnixAgentConnector};
pub use artifacts::{SavedFiles, save_public_files};
pub use config::{ClientConfig, parse_validity};
pub use credentials::{
    AuthMode, BASIC_AUTH_PREFIX, BEARER_AUTH_PREFIX, CredentialAcquirer, Credentials, Prompt,
    TerminalPrompt,
};
pub use sign::{AuthorityClient, SignRequest, SignResponse};
pub use workflow::{SignedIdentity, SigningWorkflow, WorkflowError, WorkflowState};
