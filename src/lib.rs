#![doc = include_str!("../README.md")]

pub mod client;
pub mod error;
pub mod keys;
pub mod provider;
pub mod session;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use error::Error;
pub use keys::generate_key;
#[cfg(feature = "google")]
pub use provider::{GoogleConfig, GoogleProvider};
pub use provider::{AnyProvider, Provider, ProviderConfig, TestProvider};
pub use session::{Session, generate_state};
pub use token::IdentityToken;
pub use types::KeyType;
