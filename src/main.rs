//! certgate - get a short-lived SSH certificate and load it into the agent

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use certgate::KeyType;
use certgate::client::{
    ClientConfig, SigningWorkflow, TerminalPrompt, UnixAgentConnector, parse_validity,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = ".certgate.toml";

/// Request a signed SSH certificate and add it to the running agent
#[derive(Parser)]
#[command(name = "certgate", version, about)]
struct Cli {
    /// Path to config file [default: ~/.certgate.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Certificate authority address
    #[arg(long)]
    ca: Option<Url>,

    /// Type of private key to generate: rsa, ecdsa or ed25519
    #[arg(long)]
    key_type: Option<KeyType>,

    /// Key size. Ignored for ed25519 keys
    #[arg(long)]
    key_size: Option<u32>,

    /// Requested certificate validity, e.g. 24h or 1h30m
    #[arg(long, value_parser = parse_validity)]
    validity: Option<Duration>,

    /// Save the public key and certificate as <PREFIX>.pub and <PREFIX>-cert.pub
    #[arg(long, value_name = "PREFIX")]
    public_file_prefix: Option<PathBuf>,

    /// Log in through a browser (true) or with username and password (false)
    #[arg(long, value_name = "BOOL")]
    browser_auth: Option<bool>,

    /// Do not validate the certificate authority's TLS certificate
    #[arg(long)]
    insecure: bool,

    /// SSH agent socket
    #[arg(long, env = "SSH_AUTH_SOCK", value_name = "PATH")]
    agent_socket: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = apply_flags(load_config(cli.config.as_ref())?, cli);

    let connector = match config.agent_socket() {
        Some(socket) => UnixAgentConnector::new(socket),
        None => UnixAgentConnector::from_env().context("Cannot locate the SSH agent")?,
    };

    let workflow = SigningWorkflow::new(config, TerminalPrompt, connector)
        .context("Invalid client configuration")?;
    workflow.run().await?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Error parsing config file {}", path.display())),
        None => {
            let Some(home) = dirs::home_dir() else {
                return Ok(ClientConfig::default());
            };
            let path = home.join(DEFAULT_CONFIG_FILE);
            ClientConfig::load_or_default(&path)
                .with_context(|| format!("Error parsing config file {}", path.display()))
        }
    }
}

fn apply_flags(mut config: ClientConfig, cli: Cli) -> ClientConfig {
    if let Some(ca) = cli.ca {
        config = config.with_ca(ca);
    }
    if let Some(key_type) = cli.key_type {
        config = config.with_key_type(key_type);
    }
    if let Some(key_size) = cli.key_size {
        config = config.with_key_size(key_size);
    }
    if let Some(validity) = cli.validity {
        config = config.with_validity(validity);
    }
    if let Some(prefix) = cli.public_file_prefix {
        config = config.with_public_file_prefix(prefix);
    }
    if let Some(browser_auth) = cli.browser_auth {
        config = config.with_browser_auth(browser_auth);
    }
    if cli.insecure {
        config = config.with_validate_tls_certificate(false);
    }
    if let Some(socket) = cli.agent_socket {
        config = config.with_agent_socket(socket);
    }
    config
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "certgate=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
