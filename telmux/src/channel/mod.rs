//! Channel layer between the raw connection and the terminal.
//!
//! This module defines the decoder contract the read pump drives, the
//! terminal sink decoded output is pushed to, and the `vte`-based decoder
//! shipped with the crate.

mod decoder;
pub(crate) mod terminal;
mod vt;

pub use decoder::{ChunkHook, Decoder, PassThrough};
pub use terminal::Terminal;
pub use vt::{ControlKind, VteDecoder};
