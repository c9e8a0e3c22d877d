//! Single-shot login/password autopilot.
//!
//! The autopilot watches decoded text for a configured login prompt and
//! password prompt. The first time a chunk *ends* with one of them, the
//! matching secret (plus a line terminator) is queued for the remote host,
//! the prompt is cut from the chunk, and that role is disarmed for the
//! rest of the session. A host that repeats the prompt after a failed
//! attempt therefore gets no second answer.
//!
//! [`CredentialAutopilot::process`] is pure: it returns the trimmed text and
//! the answers to send, and leaves the writing to the caller.

use std::fmt;

use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

use crate::transport::{Credential, SessionConfig};

/// Sent after every injected credential.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Which prompt an answer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptRole {
    Login,
    Password,
}

impl fmt::Display for PromptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptRole::Login => f.write_str("login"),
            PromptRole::Password => f.write_str("password"),
        }
    }
}

/// A credential answer to write to the remote host.
#[derive(Debug)]
pub struct Injection {
    role: PromptRole,
    payload: SecretString,
}

impl Injection {
    /// The prompt this answers.
    pub fn role(&self) -> PromptRole {
        self.role
    }

    /// Secret followed by [`LINE_TERMINATOR`].
    pub fn payload(&self) -> &SecretString {
        &self.payload
    }
}

/// Result of running one chunk through the autopilot.
#[derive(Debug, Default)]
pub struct Interception {
    /// The chunk with any answered prompt removed.
    pub text: String,

    /// Answers to send, login before password.
    pub injections: Vec<Injection>,
}

#[derive(Debug)]
struct Responder {
    role: PromptRole,
    prompt: String,
    secret: SecretString,
    armed: bool,
}

impl Responder {
    fn new(role: PromptRole, credential: Option<&Credential>) -> Option<Self> {
        let credential = credential.filter(|c| c.is_usable())?;
        Some(Self {
            role,
            prompt: credential.prompt.clone(),
            secret: SecretString::from(credential.secret.expose_secret().to_owned()),
            armed: true,
        })
    }

    fn answer(&mut self, text: &mut String) -> Option<Injection> {
        if !self.armed || !text.ends_with(self.prompt.as_str()) {
            return None;
        }

        text.truncate(text.len() - self.prompt.len());
        self.armed = false;
        info!("autopilot: answering {} prompt", self.role);

        let secret = self.secret.expose_secret();
        let mut payload = String::with_capacity(secret.len() + LINE_TERMINATOR.len());
        payload.push_str(secret);
        payload.push_str(LINE_TERMINATOR);

        Some(Injection {
            role: self.role,
            payload: SecretString::from(payload),
        })
    }
}

/// Login/password prompt filter with one-shot arming per role.
#[derive(Debug)]
pub struct CredentialAutopilot {
    login: Option<Responder>,
    password: Option<Responder>,
}

impl CredentialAutopilot {
    /// Build an autopilot; a role is armed only when both its prompt and
    /// its secret are non-empty.
    pub fn new(login: Option<&Credential>, password: Option<&Credential>) -> Self {
        let autopilot = Self {
            login: Responder::new(PromptRole::Login, login),
            password: Responder::new(PromptRole::Password, password),
        };
        debug!(
            "autopilot: login armed={}, password armed={}",
            autopilot.is_armed(PromptRole::Login),
            autopilot.is_armed(PromptRole::Password)
        );
        autopilot
    }

    /// Build from a session's settings.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.login.as_ref(), config.password.as_ref())
    }

    /// An autopilot that never answers.
    pub fn disabled() -> Self {
        Self {
            login: None,
            password: None,
        }
    }

    /// Whether `role` will still answer its prompt.
    pub fn is_armed(&self, role: PromptRole) -> bool {
        let responder = match role {
            PromptRole::Login => &self.login,
            PromptRole::Password => &self.password,
        };
        responder.as_ref().is_some_and(|r| r.armed)
    }

    /// Run one decoded chunk through the filter.
    pub fn process(&mut self, chunk: String) -> Interception {
        let mut interception = Interception {
            text: chunk,
            injections: Vec::new(),
        };
        if interception.text.is_empty() {
            return interception;
        }

        for responder in [self.login.as_mut(), self.password.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Some(injection) = responder.answer(&mut interception.text) {
                interception.injections.push(injection);
            }
        }

        interception
    }
}
