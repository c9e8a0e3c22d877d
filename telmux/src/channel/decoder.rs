//! Decoder contract consumed by the read pump.

use async_trait::async_trait;

use crate::error::ConfigError;

/// Observer invoked once per decoded text chunk.
///
/// The returned string replaces the chunk on its way to the terminal, so a
/// hook can consume part of the output (an answered prompt, for instance).
#[async_trait]
pub trait ChunkHook: Send {
    async fn on_chunk(&mut self, chunk: String) -> String;
}

/// Hook that forwards every chunk unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl ChunkHook for PassThrough {
    async fn on_chunk(&mut self, chunk: String) -> String {
        chunk
    }
}

/// Streaming byte-to-text decoder bound to a [`Terminal`](super::Terminal).
///
/// Feeding never suspends; all output happens in [`flush`](Self::flush).
#[async_trait]
pub trait Decoder: Send {
    /// Reconfigure byte-to-character decoding.
    ///
    /// `alternate` is the encoding selected by the decoder's own shift
    /// control codes.
    fn set_encoding(&mut self, primary: &str, alternate: &str) -> Result<(), ConfigError>;

    /// Accumulate one byte.
    fn feed_byte(&mut self, byte: u8);

    /// Accumulate a batch of bytes.
    fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed_byte(byte);
        }
    }

    /// Emit everything decoded so far.
    ///
    /// Text chunks go through `hook` and then to the terminal; control
    /// strings go straight to their terminal channels. Output order follows
    /// input order.
    async fn flush(&mut self, hook: &mut dyn ChunkHook);
}
