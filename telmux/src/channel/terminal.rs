//! Presentation sink contract.

use async_trait::async_trait;
use log::debug;

/// A terminal that receives strings with embedded ANSI escape sequences.
///
/// Implemented by whatever displays a session to its user. Decoded text
/// arrives through [`write`](Self::write); device-control, operating-system
/// command, privacy-message and application-program-command strings arrive
/// on their own channels, already stripped of their introducers and
/// terminators.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Decoded text, possibly with embedded CSI/ESC sequences.
    async fn write(&self, data: &str);

    /// A failure the user should see.
    async fn error(&self, message: &str);

    /// The session has ended; no more output follows.
    async fn stop(&self);

    /// Device Control String
    async fn dcs(&self, data: &str) {
        debug!("DCS {:?}", data);
    }

    /// Operating System Command
    async fn osc(&self, data: &str) {
        debug!("OSC {:?}", data);
    }

    /// Privacy Message
    async fn pm(&self, data: &str) {
        debug!("PM {:?}", data);
    }

    /// Application Program Command
    async fn apc(&self, data: &str) {
        debug!("APC {:?}", data);
    }
}
