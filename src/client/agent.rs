//! Loading signed identities into a local SSH agent.
//!
//! Only the add-identity request of the agent protocol is spoken here:
//!
//! ```text
//! uint32 length | byte SSH_AGENTC_ADD_ID_CONSTRAINED
//!   string cert type | string cert blob | private fields | string comment
//!   byte SSH_AGENT_CONSTRAIN_LIFETIME | uint32 seconds
//! ```

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ssh_encoding::{Decode, Encode};
use ssh_key::private::KeypairData;
use ssh_key::{Certificate, Mpint, PrivateKey};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::Error;

/// Environment variable naming the agent socket.
pub const AUTH_SOCK_ENV: &str = "SSH_AUTH_SOCK";

const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENT_SUCCESS: u8 = 6;
const SSH_AGENTC_ADD_IDENTITY: u8 = 17;
const SSH_AGENTC_ADD_ID_CONSTRAINED: u8 = 25;
const SSH_AGENT_CONSTRAIN_LIFETIME: u8 = 1;

/// Maximum reply size accepted from the agent.
const MAX_FRAME_SIZE: usize = 256 * 1024;

/// A private key and its certificate, as handed to the agent.
#[derive(Debug)]
pub struct AgentIdentity<'a> {
    key: &'a PrivateKey,
    certificate: &'a Certificate,
    comment: String,
    lifetime: Option<Duration>,
}

impl<'a> AgentIdentity<'a> {
    /// Identity that the agent drops when the certificate expires.
    #[must_use]
    pub fn for_certificate(key: &'a PrivateKey, certificate: &'a Certificate) -> Self {
        let valid_before = certificate.valid_before();
        let expires = i64::try_from(valid_before)
            .ok()
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| "never".into());

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let lifetime = match valid_before {
            u64::MAX => None,
            before => Some(Duration::from_secs(before.saturating_sub(now).max(1))),
        };

        Self {
            key,
            certificate,
            comment: format!("{} [Expires {expires}]", certificate.key_id()),
            lifetime,
        }
    }

    #[must_use]
    pub fn key(&self) -> &PrivateKey {
        self.key
    }

    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        self.certificate
    }

    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    #[must_use]
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Encodes the add-identity request body (without the length prefix).
    fn encode_request(&self) -> Result<Vec<u8>, Error> {
        let mut msg = Vec::new();
        msg.push(match self.lifetime {
            Some(_) => SSH_AGENTC_ADD_ID_CONSTRAINED,
            None => SSH_AGENTC_ADD_IDENTITY,
        });

        let blob = self.certificate.to_bytes()?;
        let cert_type = String::decode(&mut blob.as_slice())?;
        cert_type.as_str().encode(&mut msg)?;
        blob.as_slice().encode(&mut msg)?;

        match self.key.key_data() {
            KeypairData::Ed25519(keypair) => {
                keypair.public.0.as_slice().encode(&mut msg)?;
                keypair.to_bytes().as_slice().encode(&mut msg)?;
            }
            KeypairData::Ecdsa(keypair) => {
                Mpint::from_positive_bytes(keypair.private_key_bytes())?.encode(&mut msg)?;
            }
            KeypairData::Rsa(keypair) => {
                keypair.private.d.encode(&mut msg)?;
                keypair.private.iqmp.encode(&mut msg)?;
                keypair.private.p.encode(&mut msg)?;
                keypair.private.q.encode(&mut msg)?;
            }
            _ => {
                return Err(Error::Agent(format!(
                    "unsupported key algorithm {}",
                    self.key.algorithm()
                )));
            }
        }

        self.comment.as_str().encode(&mut msg)?;
        if let Some(lifetime) = self.lifetime {
            msg.push(SSH_AGENT_CONSTRAIN_LIFETIME);
            let secs = u32::try_from(lifetime.as_secs()).unwrap_or(u32::MAX);
            secs.encode(&mut msg)?;
        }
        Ok(msg)
    }
}

/// An open connection to an SSH agent.
pub trait Agent: Send {
    /// Load a key and its certificate.
    fn add_identity(
        &mut self,
        identity: &AgentIdentity<'_>,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Opens agent connections on demand.
pub trait AgentConnector: Send + Sync {
    type Agent: Agent;

    /// # Errors
    ///
    /// Returns [`Error::Agent`] if the agent cannot be reached.
    fn connect(&self) -> impl Future<Output = Result<Self::Agent, Error>> + Send;
}

/// Connects to the agent listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct UnixAgentConnector {
    socket: PathBuf,
}

impl UnixAgentConnector {
    #[must_use]
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Socket named by `SSH_AUTH_SOCK`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Agent`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var_os(AUTH_SOCK_ENV) {
            Some(path) if !path.is_empty() => Ok(Self::new(path)),
            _ => Err(Error::Agent(format!("{AUTH_SOCK_ENV} is not set"))),
        }
    }

    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

impl AgentConnector for UnixAgentConnector {
    type Agent = UnixAgent;

    async fn connect(&self) -> Result<UnixAgent, Error> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
            Error::Agent(format!(
                "error connecting to agent at {}: {e}",
                self.socket.display()
            ))
        })?;
        tracing::debug!(socket = %self.socket.display(), "Connected to SSH agent");
        Ok(UnixAgent { stream })
    }
}

/// Agent connection over a Unix socket; closed on drop.
#[derive(Debug)]
pub struct UnixAgent {
    stream: UnixStream,
}

impl Agent for UnixAgent {
    async fn add_identity(&mut self, identity: &AgentIdentity<'_>) -> Result<(), Error> {
        let request = identity.encode_request()?;
        write_frame(&mut self.stream, &request).await?;

        let reply = read_frame(&mut self.stream).await?;
        match reply.first() {
            Some(&SSH_AGENT_SUCCESS) => Ok(()),
            Some(&SSH_AGENT_FAILURE) => Err(Error::Agent("agent refused the identity".into())),
            other => Err(Error::Agent(format!("unexpected agent reply {other:?}"))),
        }
    }
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes"),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use ssh_key::certificate::{Builder, CertType};
    use ssh_key::rand_core::OsRng;
    use tokio::net::UnixListener;

    use super::*;
    use crate::keys::generate_key;
    use crate::types::KeyType;

    fn sign_cert(key: &PrivateKey, valid_before: u64) -> Certificate {
        let ca = generate_key(KeyType::Ed25519, 0).unwrap();
        let mut builder = Builder::new_with_random_nonce(
            &mut OsRng,
            key.public_key().key_data().clone(),
            0,
            valid_before,
        )
        .unwrap();
        builder.serial(1).unwrap();
        builder.key_id("alice@example.com").unwrap();
        builder.cert_type(CertType::User).unwrap();
        builder.valid_principal("alice").unwrap();
        builder.sign(&ca).unwrap()
    }

    fn in_one_hour() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600
    }

    #[test]
    fn test_identity_comment_and_lifetime() {
        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(&key, in_one_hour());
        let identity = AgentIdentity::for_certificate(&key, &cert);

        assert!(identity.comment().starts_with("alice@example.com [Expires "));
        let lifetime = identity.lifetime().unwrap();
        assert!(lifetime <= Duration::from_secs(3600));
        assert!(lifetime > Duration::from_secs(3500));
    }

    #[test]
    fn test_unbounded_certificate_has_no_lifetime() {
        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(&key, u64::MAX);
        let identity = AgentIdentity::for_certificate(&key, &cert);

        assert_eq!(identity.lifetime(), None);
        assert!(identity.comment().ends_with("[Expires never]"));
        assert_eq!(identity.encode_request().unwrap()[0], SSH_AGENTC_ADD_IDENTITY);
    }

    #[test]
    fn test_encode_ed25519_request() {
        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(&key, in_one_hour());
        let msg = AgentIdentity::for_certificate(&key, &cert)
            .encode_request()
            .unwrap();

        assert_eq!(msg[0], SSH_AGENTC_ADD_ID_CONSTRAINED);
        let mut body = &msg[1..];
        let cert_type = String::decode(&mut body).unwrap();
        assert_eq!(cert_type, "ssh-ed25519-cert-v01@openssh.com");
        let blob = Vec::<u8>::decode(&mut body).unwrap();
        assert_eq!(blob, cert.to_bytes().unwrap());
        // lifetime constraint closes the message
        assert_eq!(msg[msg.len() - 5], SSH_AGENT_CONSTRAIN_LIFETIME);
    }

    #[test]
    fn test_encode_ecdsa_request() {
        let key = generate_key(KeyType::Ecdsa, 256).unwrap();
        let cert = sign_cert(&key, in_one_hour());
        let msg = AgentIdentity::for_certificate(&key, &cert)
            .encode_request()
            .unwrap();
        let mut body = &msg[1..];
        assert_eq!(
            String::decode(&mut body).unwrap(),
            "ecdsa-sha2-nistp256-cert-v01@openssh.com"
        );
    }

    #[tokio::test]
    async fn test_add_identity_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &[SSH_AGENT_SUCCESS]).await.unwrap();
            request
        });

        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(&key, in_one_hour());
        let identity = AgentIdentity::for_certificate(&key, &cert);

        let mut agent = UnixAgentConnector::new(&socket).connect().await.unwrap();
        agent.add_identity(&identity).await.unwrap();

        let request = server.await.unwrap();
        assert_eq!(request, identity.encode_request().unwrap());
    }

    #[tokio::test]
    async fn test_agent_failure_reply() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &[SSH_AGENT_FAILURE]).await.unwrap();
        });

        let key = generate_key(KeyType::Ed25519, 0).unwrap();
        let cert = sign_cert(&key, in_one_hour());
        let mut agent = UnixAgentConnector::new(&socket).connect().await.unwrap();
        let result = agent
            .add_identity(&AgentIdentity::for_certificate(&key, &cert))
            .await;
        assert!(matches!(result, Err(Error::Agent(_))));
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let connector = UnixAgentConnector::new(dir.path().join("nope.sock"));
        assert!(matches!(connector.connect().await, Err(Error::Agent(_))));
    }
}
