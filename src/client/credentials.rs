use std::io::{self, BufRead, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::error::Error;

pub const BEARER_AUTH_PREFIX: &str = "Bearer ";
pub const BASIC_AUTH_PREFIX: &str = "Basic ";

/// Interaction with the person running the client.
pub trait Prompt {
    /// Show `prompt` and read one line.
    fn read_line(&mut self, prompt: &str) -> io::Result<String>;

    /// Show `prompt` and read one line without echoing it.
    fn read_secret(&mut self, prompt: &str) -> io::Result<String>;

    /// Open `url` in the user's web browser.
    fn open_url(&mut self, url: &str) -> io::Result<()>;

    /// Show an informational message.
    fn notify(&mut self, message: &str);
}

/// [`Prompt`] on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }

    fn read_secret(&mut self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(prompt)
    }

    fn open_url(&mut self, url: &str) -> io::Result<()> {
        open::that(url)
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}

/// How the user proves their identity to the certificate authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Log in through the authority's web page, then paste the issued token.
    Browser,
    /// Send a username and password.
    Password,
}

/// Value for the `Authorization` header of a signing request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    #[must_use]
    pub fn bearer(token: &str) -> Self {
        Self(format!("{BEARER_AUTH_PREFIX}{token}"))
    }

    #[must_use]
    pub fn basic(username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        Self(format!("{BASIC_AUTH_PREFIX}{encoded}"))
    }

    #[must_use]
    pub fn header_value(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = self.0.split_once(' ').map_or("", |(scheme, _)| scheme);
        write!(f, "Credentials({scheme} <redacted>)")
    }
}

/// Obtains the credential string sent with a signing request.
///
/// Performs no validation beyond rejecting empty input; the authority's
/// provider decides whether the credential is any good.
pub struct CredentialAcquirer<P> {
    mode: AuthMode,
    ca: Url,
    prompt: P,
}

impl<P: Prompt> CredentialAcquirer<P> {
    #[must_use]
    pub fn new(mode: AuthMode, ca: Url, prompt: P) -> Self {
        Self { mode, ca, prompt }
    }

    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Mutable access to the prompt, for messages outside credential entry.
    pub fn prompt_mut(&mut self) -> &mut P {
        &mut self.prompt
    }

    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if reading from the prompt fails or the
    /// user enters nothing.
    pub fn obtain(&mut self) -> Result<Credentials, Error> {
        match self.mode {
            AuthMode::Browser => self.obtain_bearer(),
            AuthMode::Password => self.obtain_basic(),
        }
    }

    fn obtain_bearer(&mut self) -> Result<Credentials, Error> {
        let url = self.ca.as_str();
        match self.prompt.open_url(url) {
            Ok(()) => self
                .prompt
                .notify(&format!("Your browser has been opened to visit {url}")),
            Err(e) => {
                tracing::debug!(error = %e, "Could not launch browser");
                self.prompt.notify(&format!(
                    "Error launching web browser. Go to {url} in your web browser"
                ));
            }
        }

        let token = read_required(self.prompt.read_line("Enter token: "), "token")?;
        Ok(Credentials::bearer(&token))
    }

    fn obtain_basic(&mut self) -> Result<Credentials, Error> {
        let username = read_required(self.prompt.read_line("Username: "), "username")?;
        let password = self
            .prompt
            .read_secret("Password: ")
            .map_err(|e| Error::Credentials(format!("failed to read password: {e}")))?;
        let password = password.trim_end_matches(['\r', '\n']);
        Ok(Credentials::basic(&username, password))
    }
}

fn read_required(input: io::Result<String>, what: &str) -> Result<String, Error> {
    let value = input.map_err(|e| Error::Credentials(format!("failed to read {what}: {e}")))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Credentials(format!("no {what} entered")));
    }
    Ok(value.to_string())
}
