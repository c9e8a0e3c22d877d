//! Telnet command stripping and option negotiation.
//!
//! Inbound bytes pass through [`TelnetFilter`], which removes telnet
//! commands from the data stream and produces the replies the client owes
//! the remote host. Only TERMINAL-TYPE is actively supported; ECHO and
//! SUPPRESS-GO-AHEAD are accepted when the server offers them and every
//! other option is refused.

use bytes::BytesMut;
use memchr::memchr;

pub(crate) const IAC: u8 = 255;
pub(crate) const DONT: u8 = 254;
pub(crate) const DO: u8 = 253;
pub(crate) const WONT: u8 = 252;
pub(crate) const WILL: u8 = 251;
pub(crate) const SB: u8 = 250;
pub(crate) const SE: u8 = 240;

pub(crate) const OPT_ECHO: u8 = 1;
pub(crate) const OPT_SGA: u8 = 3;
pub(crate) const OPT_TTYPE: u8 = 24;

const TTYPE_IS: u8 = 0;
const TTYPE_SEND: u8 = 1;

/// Upper bound on buffered subnegotiation payload.
const MAX_SUBNEGOTIATION: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Output of one [`TelnetFilter::filter`] call.
#[derive(Debug, Default)]
pub(crate) struct Filtered {
    /// Application data with telnet commands removed.
    pub data: BytesMut,

    /// Bytes to send back to the remote host.
    pub reply: Vec<u8>,
}

/// Streaming telnet protocol filter.
///
/// Commands may be split across reads; the filter keeps its parse state
/// between calls.
#[derive(Debug)]
pub(crate) struct TelnetFilter {
    state: State,
    terminal_type: String,
    sub: Vec<u8>,
    /// Options we agreed to perform (answered WILL).
    local: [bool; 256],
    /// Options we asked the server to perform (answered DO).
    remote: [bool; 256],
}

impl TelnetFilter {
    pub(crate) fn new(terminal_type: impl Into<String>) -> Self {
        Self {
            state: State::Data,
            terminal_type: terminal_type.into(),
            sub: Vec::new(),
            local: [false; 256],
            remote: [false; 256],
        }
    }

    /// Strip telnet commands from `input`, appending data and replies to `out`.
    pub(crate) fn filter(&mut self, input: &[u8], out: &mut Filtered) {
        let mut rest = input;
        while !rest.is_empty() {
            if self.state == State::Data {
                match memchr(IAC, rest) {
                    None => {
                        out.data.extend_from_slice(rest);
                        return;
                    }
                    Some(pos) => {
                        out.data.extend_from_slice(&rest[..pos]);
                        self.state = State::Iac;
                        rest = &rest[pos + 1..];
                        continue;
                    }
                }
            }

            let byte = rest[0];
            rest = &rest[1..];
            self.step(byte, out);
        }
    }

    fn step(&mut self, byte: u8, out: &mut Filtered) {
        self.state = match (self.state, byte) {
            (State::Iac, IAC) => {
                out.data.extend_from_slice(&[IAC]);
                State::Data
            }
            (State::Iac, DO | DONT | WILL | WONT) => State::Negotiate(byte),
            (State::Iac, SB) => {
                self.sub.clear();
                State::Sub
            }
            // NOP, GA, DM, BRK and friends carry no data for us
            (State::Iac, _) => State::Data,
            (State::Negotiate(verb), option) => {
                self.negotiate(verb, option, &mut out.reply);
                State::Data
            }
            (State::Sub, IAC) => State::SubIac,
            (State::Sub, b) => {
                if self.sub.len() < MAX_SUBNEGOTIATION {
                    self.sub.push(b);
                }
                State::Sub
            }
            (State::SubIac, SE) => {
                self.subnegotiate(&mut out.reply);
                State::Data
            }
            (State::SubIac, IAC) => {
                if self.sub.len() < MAX_SUBNEGOTIATION {
                    self.sub.push(IAC);
                }
                State::Sub
            }
            (State::SubIac, _) => State::Sub,
            (State::Data, b) => {
                out.data.extend_from_slice(&[b]);
                State::Data
            }
        };
    }

    fn negotiate(&mut self, verb: u8, option: u8, reply: &mut Vec<u8>) {
        let idx = option as usize;
        match verb {
            DO if option == OPT_TTYPE => {
                if !self.local[idx] {
                    self.local[idx] = true;
                    reply.extend_from_slice(&[IAC, WILL, option]);
                }
            }
            DO => reply.extend_from_slice(&[IAC, WONT, option]),
            WILL if option == OPT_ECHO || option == OPT_SGA => {
                if !self.remote[idx] {
                    self.remote[idx] = true;
                    reply.extend_from_slice(&[IAC, DO, option]);
                }
            }
            WILL => reply.extend_from_slice(&[IAC, DONT, option]),
            // Disabling an agreed option must be acknowledged
            DONT => {
                if self.local[idx] {
                    self.local[idx] = false;
                    reply.extend_from_slice(&[IAC, WONT, option]);
                }
            }
            WONT => {
                if self.remote[idx] {
                    self.remote[idx] = false;
                    reply.extend_from_slice(&[IAC, DONT, option]);
                }
            }
            _ => {}
        }
    }

    fn subnegotiate(&mut self, reply: &mut Vec<u8>) {
        if self.sub.as_slice() == [OPT_TTYPE, TTYPE_SEND] {
            reply.extend_from_slice(&[IAC, SB, OPT_TTYPE, TTYPE_IS]);
            reply.extend_from_slice(self.terminal_type.as_bytes());
            reply.extend_from_slice(&[IAC, SE]);
        }
        self.sub.clear();
    }
}

/// Double every IAC byte so outbound data is not read as a command.
pub(crate) fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut rest = data;
    while let Some(pos) = memchr(IAC, rest) {
        out.extend_from_slice(&rest[..=pos]);
        out.push(IAC);
        rest = &rest[pos + 1..];
    }
    out.extend_from_slice(rest);
    out
}
