//! Per-session read pump.
//!
//! Moves bytes from the connection into the decoder until the connection
//! dies or the pump is cancelled. Each batch is flushed through an
//! [`AutopilotHook`] so prompts can be answered before the text reaches the
//! terminal.

use async_trait::async_trait;
use log::{trace, warn};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::autopilot::CredentialAutopilot;
use crate::channel::{ChunkHook, Decoder};
use crate::transport::{ConnectionReader, RawConnection};

/// Why a read pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The connection is gone (remote close or a failed write).
    Disconnected,
    /// A read failed.
    Failed,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The session was disconnected explicitly.
    Closed,
}

/// Everything the pump owns exclusively.
pub(crate) struct ReadPump {
    reader: ConnectionReader,
    decoder: Box<dyn Decoder>,
    autopilot: CredentialAutopilot,
}

impl ReadPump {
    pub(crate) fn new(
        reader: ConnectionReader,
        decoder: Box<dyn Decoder>,
        autopilot: CredentialAutopilot,
    ) -> Self {
        Self {
            reader,
            decoder,
            autopilot,
        }
    }

    /// Pump until the connection dies or a token fires. Never fails.
    pub(crate) async fn run(mut self, session: &Session, cancel: &CancellationToken) -> PumpExit {
        let shutdown = session.shutdown_token();

        loop {
            if cancel.is_cancelled() {
                return PumpExit::Cancelled;
            }
            if shutdown.is_cancelled() {
                return PumpExit::Closed;
            }
            if !session.is_connected() {
                return PumpExit::Disconnected;
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                _ = shutdown.cancelled() => return PumpExit::Closed,
                _ = session.connection().disconnected() => return PumpExit::Disconnected,
                read = self.reader.read() => read,
            };

            let data = match read {
                Ok(Some(data)) => data,
                Ok(None) => return PumpExit::Disconnected,
                Err(e) => {
                    warn!("session {}: read failed: {}", session.key(), e);
                    session.terminal().error(&e.to_string()).await;
                    return PumpExit::Failed;
                }
            };

            if data.is_empty() {
                continue;
            }
            // A concurrent write may have failed while this batch was read
            if !session.is_connected() {
                return PumpExit::Disconnected;
            }
            trace!("session {}: decoding {} bytes", session.key(), data.len());

            self.decoder.feed(&data);
            let mut hook = AutopilotHook {
                key: session.key(),
                autopilot: &mut self.autopilot,
                connection: session.connection(),
            };
            // Sink calls and autopilot writes may stall; stay cancellable
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                _ = shutdown.cancelled() => return PumpExit::Closed,
                _ = self.decoder.flush(&mut hook) => {}
            }
        }
    }
}

/// Runs decoded chunks through the autopilot and sends its answers.
struct AutopilotHook<'a> {
    key: &'a str,
    autopilot: &'a mut CredentialAutopilot,
    connection: &'a RawConnection,
}

#[async_trait]
impl ChunkHook for AutopilotHook<'_> {
    async fn on_chunk(&mut self, chunk: String) -> String {
        let interception = self.autopilot.process(chunk);

        for injection in &interception.injections {
            let payload = injection.payload().expose_secret();
            if let Err(e) = self.connection.write_str(payload).await {
                // The connection is now marked dead; the pump exits next turn
                warn!(
                    "session {}: failed to send {} answer: {}",
                    self.key,
                    injection.role(),
                    e
                );
                break;
            }
        }

        interception.text
    }
}
