//! Session lifecycle.
//!
//! A [`Session`] binds one remote connection, one decoder and one
//! credential autopilot. Sessions are created and torn down through the
//! [`SessionRegistry`], which also drives each session's read pump.

mod builder;
mod pump;
mod registry;

pub use builder::SessionBuilder;
pub use pump::PumpExit;
pub use registry::SessionRegistry;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use tokio_util::sync::CancellationToken;

use self::pump::ReadPump;
use crate::autopilot::CredentialAutopilot;
use crate::channel::{Decoder, Terminal};
use crate::error::Result;
use crate::transport::{ConnectionReader, RawConnection};

/// Opaque, caller-supplied session identifier.
pub type SessionKey = String;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created, not yet registered.
    Idle = 0,
    /// Registered with a live connection.
    Connected = 1,
    /// Read pump has stopped; teardown in progress.
    Draining = 2,
    /// Connection released and the terminal told to stop.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connected,
            2 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// One remote terminal session.
pub struct Session {
    key: SessionKey,
    connection: Arc<RawConnection>,
    terminal: Arc<dyn Terminal>,
    state: AtomicU8,

    /// Cancelled by an explicit disconnect to wake the read pump.
    shutdown: CancellationToken,

    /// Read side, decoder and autopilot; taken by the single read pump.
    pump: Mutex<Option<ReadPump>>,
}

impl Session {
    pub(crate) fn new(
        key: SessionKey,
        reader: ConnectionReader,
        decoder: Box<dyn Decoder>,
        autopilot: CredentialAutopilot,
        terminal: Arc<dyn Terminal>,
    ) -> Self {
        Self {
            key,
            connection: Arc::clone(reader.connection()),
            terminal,
            state: AtomicU8::new(SessionState::Idle as u8),
            shutdown: CancellationToken::new(),
            pump: Mutex::new(Some(ReadPump::new(reader, decoder, autopilot))),
        }
    }

    /// The key this session is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = SessionState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            debug!("session {}: {:?} -> {:?}", self.key, previous, state);
        }
    }

    /// Whether the underlying connection is still usable.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &RawConnection {
        &self.connection
    }

    pub(crate) fn terminal(&self) -> &Arc<dyn Terminal> {
        &self.terminal
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Send text to the remote host.
    ///
    /// Serialized with autopilot answers and telnet replies on the same
    /// connection.
    pub async fn write(&self, text: &str) -> Result<()> {
        self.connection.write_str(text).await?;
        Ok(())
    }

    /// Hand the read side to a pump. Returns `None` once taken.
    pub(crate) fn take_pump(&self) -> Option<ReadPump> {
        self.pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Release the connection and wake the pump. Idempotent.
    pub(crate) async fn close(&self) {
        self.shutdown.cancel();
        self.connection.close().await;

        // Nobody pumped this session, so nobody else will finish it
        if self.take_pump().is_some() {
            self.finish().await;
        }
    }

    /// Move to `Closed` and stop the terminal, once.
    pub(crate) async fn finish(&self) {
        let previous = self.state.swap(SessionState::Closed as u8, Ordering::SeqCst);
        if previous != SessionState::Closed as u8 {
            debug!(
                "session {}: {:?} -> Closed",
                self.key,
                SessionState::from_u8(previous)
            );
            self.terminal.stop().await;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
