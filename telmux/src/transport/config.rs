//! Session connection settings.

use std::time::Duration;

use encoding_rs::Encoding;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Default telnet port.
pub const DEFAULT_PORT: u16 = 23;

/// Default terminal type announced during TERMINAL-TYPE negotiation.
pub const DEFAULT_TERMINAL_TYPE: &str = "xterm";

/// Default character encoding label.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// A prompt and the secret to answer it with.
#[derive(Debug)]
pub struct Credential {
    /// Literal text the remote host ends its output with when asking.
    pub prompt: String,

    /// The answer, sent followed by a line terminator.
    pub secret: SecretString,
}

impl Credential {
    /// Create a new prompt/secret pair.
    pub fn new(prompt: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Whether both the prompt and the secret are non-empty.
    pub fn is_usable(&self) -> bool {
        !self.prompt.is_empty() && !self.secret.expose_secret().is_empty()
    }
}

/// Settings for one remote terminal session.
///
/// Delivered to [`SessionRegistry::connect`](crate::SessionRegistry::connect)
/// as an immutable value; the session never consults any other
/// configuration source.
#[derive(Debug)]
pub struct SessionConfig {
    /// Remote host (hostname or IP address).
    pub host: String,

    /// Remote port (default: 23).
    pub port: u16,

    /// Terminal type reported to the remote host.
    pub terminal_type: String,

    /// Primary character encoding label (e.g. "utf-8", "ibm866").
    pub encoding: String,

    /// Encoding selected by shift-out; defaults to the primary encoding.
    pub alternate_encoding: Option<String>,

    /// Login prompt autopilot.
    pub login: Option<Credential>,

    /// Password prompt autopilot.
    pub password: Option<Credential>,

    /// Connection timeout.
    pub timeout: Duration,
}

impl SessionConfig {
    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Alternate encoding label, falling back to the primary one.
    pub fn alternate_encoding(&self) -> &str {
        self.alternate_encoding.as_deref().unwrap_or(&self.encoding)
    }
}

/// Look up an encoding by its WHATWG label.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ConfigError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| ConfigError::UnknownEncoding {
        label: label.to_string(),
    })
}
