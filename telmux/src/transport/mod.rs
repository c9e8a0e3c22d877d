//! Telnet transport layer.
//!
//! This module provides the low-level connection management: TCP connect,
//! telnet command filtering and negotiation, and serialized writes.

pub mod config;
mod connection;
mod telnet;

pub use config::{Credential, SessionConfig};
pub use connection::{ConnectionReader, RawConnection, READ_BUFFER_SIZE};
