//! # Telmux
//!
//! Async telnet session multiplexer.
//!
//! Telmux keeps many independent remote-terminal sessions open at once, each
//! under a caller-chosen key. Every session pumps bytes from its telnet
//! connection through a terminal decoder into a push-style [`Terminal`] sink,
//! and can answer a login and a password prompt on its own.
//!
//! ## Features
//!
//! - Concurrent session registry with race-tolerant lookups
//! - Telnet option negotiation (terminal type, echo, suppress-go-ahead)
//! - Charset transcoding with shift-out/shift-in switching
//! - ANSI-aware decoding via vte, with DCS/OSC/PM/APC routed separately
//! - Single-shot credential autopilot
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use telmux::{SessionBuilder, SessionRegistry, Terminal};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Stdout;
//!
//! #[async_trait]
//! impl Terminal for Stdout {
//!     async fn write(&self, text: &str) {
//!         print!("{}", text);
//!     }
//!     async fn error(&self, message: &str) {
//!         eprintln!("error: {}", message);
//!     }
//!     async fn stop(&self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), telmux::Error> {
//!     let config = SessionBuilder::new("192.168.1.1")
//!         .login("login: ", "admin")
//!         .password("Password: ", "secret")
//!         .build()?;
//!
//!     let registry = Arc::new(SessionRegistry::new());
//!     registry.connect("router", &config, Arc::new(Stdout)).await?;
//!     let pump = registry.spawn_read_loop("router", CancellationToken::new());
//!
//!     registry.write("router", "show version\r\n").await?;
//!
//!     registry.disconnect("router").await;
//!     pump.await.ok();
//!     Ok(())
//! }
//! ```

pub mod autopilot;
pub mod channel;
pub mod error;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use autopilot::{CredentialAutopilot, PromptRole};
pub use channel::{ChunkHook, Decoder, Terminal, VteDecoder};
pub use error::{Error, Result};
pub use session::{PumpExit, Session, SessionBuilder, SessionKey, SessionRegistry, SessionState};
pub use transport::{Credential, RawConnection, SessionConfig};
