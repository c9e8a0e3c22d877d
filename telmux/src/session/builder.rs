//! Builder for session settings.

use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::transport::config::{
    Credential, DEFAULT_ENCODING, DEFAULT_PORT, DEFAULT_TERMINAL_TYPE, SessionConfig,
    resolve_encoding,
};

/// Builder for constructing [`SessionConfig`] values.
///
/// # Example
///
/// ```rust
/// use telmux::SessionBuilder;
///
/// # fn example() -> Result<(), telmux::Error> {
/// let config = SessionBuilder::new("bbs.example.org")
///     .port(2323)
///     .terminal_type("vt100")
///     .encoding("ibm866")
///     .login("login: ", "guest")
///     .build()?;
/// assert_eq!(config.socket_addr(), "bbs.example.org:2323");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionBuilder {
    host: String,
    port: u16,
    terminal_type: String,
    encoding: String,
    alternate_encoding: Option<String>,
    login: Option<Credential>,
    password: Option<Credential>,
    timeout: Duration,
}

impl SessionBuilder {
    /// Create a new builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            terminal_type: DEFAULT_TERMINAL_TYPE.to_string(),
            encoding: DEFAULT_ENCODING.to_string(),
            alternate_encoding: None,
            login: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the port (default: 23).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the terminal type reported to the host (default: "xterm").
    pub fn terminal_type(mut self, terminal_type: impl Into<String>) -> Self {
        self.terminal_type = terminal_type.into();
        self
    }

    /// Set the primary character encoding (default: "utf-8").
    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    /// Set the encoding selected by shift-out.
    pub fn alternate_encoding(mut self, label: impl Into<String>) -> Self {
        self.alternate_encoding = Some(label.into());
        self
    }

    /// Answer `prompt` with `login` once.
    pub fn login(mut self, prompt: impl Into<String>, login: impl Into<String>) -> Self {
        self.login = Some(Credential::new(prompt, login));
        self
    }

    /// Answer `prompt` with `password` once.
    pub fn password(mut self, prompt: impl Into<String>, password: impl Into<String>) -> Self {
        self.password = Some(Credential::new(prompt, password));
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate and build the settings.
    pub fn build(self) -> Result<SessionConfig> {
        if self.host.trim().is_empty() {
            return Err(invalid("Host is required"));
        }
        if self.port == 0 {
            return Err(invalid("Port must be non-zero"));
        }
        if self.terminal_type.is_empty() || !self.terminal_type.is_ascii() {
            return Err(invalid("Terminal type must be non-empty ASCII"));
        }

        resolve_encoding(&self.encoding)?;
        if let Some(ref alternate) = self.alternate_encoding {
            resolve_encoding(alternate)?;
        }

        Ok(SessionConfig {
            host: self.host,
            port: self.port,
            terminal_type: self.terminal_type,
            encoding: self.encoding,
            alternate_encoding: self.alternate_encoding,
            login: self.login,
            password: self.password,
            timeout: self.timeout,
        })
    }
}

fn invalid(message: &str) -> crate::Error {
    ConfigError::InvalidConfig {
        message: message.to_string(),
    }
    .into()
}
