//! VT decoder built on `vte`.
//!
//! Inbound bytes are transcoded to UTF-8 with the active character set, then
//! parsed. Printable text, C0 controls and CSI/ESC sequences are collected
//! as plain text (the terminal renders them); DCS, OSC, PM and APC strings
//! are routed to their own terminal channels.
//!
//! `vte` discards PM and APC strings, so those two are captured before the
//! bytes reach the parser.

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use encoding_rs::{CoderResult, Encoding};
use log::trace;
use memchr::memchr;
use vte::{Params, Parser, Perform};

use super::decoder::{ChunkHook, Decoder};
use super::terminal::Terminal;
use crate::error::ConfigError;
use crate::transport::config::resolve_encoding;

const BEL: u8 = 0x07;
const SO: u8 = 0x0e;
const SI: u8 = 0x0f;
const ESC: u8 = 0x1b;

/// Upper bound on a captured PM/APC/DCS string.
const MAX_CONTROL_STRING: usize = 4096;

/// Category of a control string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Device Control String
    Dcs,
    /// Operating System Command
    Osc,
    /// Privacy Message
    Pm,
    /// Application Program Command
    Apc,
}

#[derive(Debug)]
enum Event {
    Text(String),
    Control(ControlKind, String),
}

/// `vte` performer that accumulates decoder output in order.
#[derive(Debug, Default)]
struct Collector {
    text: String,
    events: Vec<Event>,
    dcs: Option<Vec<u8>>,
}

impl Collector {
    fn push_control(&mut self, kind: ControlKind, data: String) {
        self.end_text();
        self.events.push(Event::Control(kind, data));
    }

    fn end_text(&mut self) {
        if !self.text.is_empty() {
            self.events.push(Event::Text(mem::take(&mut self.text)));
        }
    }

    fn drain(&mut self) -> Vec<Event> {
        self.end_text();
        mem::take(&mut self.events)
    }
}

fn push_params(out: &mut String, params: &Params) {
    for (i, group) in params.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        for (j, value) in group.iter().enumerate() {
            if j > 0 {
                out.push(':');
            }
            out.push_str(&value.to_string());
        }
    }
}

/// Private markers (`?`, `>`, ...) precede the parameters, true
/// intermediates follow them.
fn push_sequence(out: &mut String, params: &Params, intermediates: &[u8], action: char) {
    for &b in intermediates.iter().filter(|b| (0x3c..=0x3f).contains(*b)) {
        out.push(b as char);
    }
    push_params(out, params);
    for &b in intermediates.iter().filter(|b| (0x20..=0x2f).contains(*b)) {
        out.push(b as char);
    }
    out.push(action);
}

impl Perform for Collector {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        self.text.push(byte as char);
    }

    fn hook(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        let mut header = String::new();
        push_sequence(&mut header, params, intermediates, action);
        self.dcs = Some(header.into_bytes());
    }

    fn put(&mut self, byte: u8) {
        if let Some(dcs) = self.dcs.as_mut() {
            if dcs.len() < MAX_CONTROL_STRING {
                dcs.push(byte);
            }
        }
    }

    fn unhook(&mut self) {
        if let Some(dcs) = self.dcs.take() {
            self.push_control(ControlKind::Dcs, String::from_utf8_lossy(&dcs).into_owned());
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        let data = params
            .iter()
            .map(|p| String::from_utf8_lossy(p))
            .collect::<Vec<_>>()
            .join(";");
        self.push_control(ControlKind::Osc, data);
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        self.text.push_str("\x1b[");
        push_sequence(&mut self.text, params, intermediates, action);
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        // A bare ST closes a string that has already been dispatched
        if ignore || (intermediates.is_empty() && byte == b'\\') {
            return;
        }
        self.text.push(ESC as char);
        for &b in intermediates {
            self.text.push(b as char);
        }
        self.text.push(byte as char);
    }
}

/// PM/APC capture state, ahead of the parser.
#[derive(Debug)]
enum Capture {
    Ground,
    Escape,
    String(ControlKind, Vec<u8>),
    StringEscape(ControlKind, Vec<u8>),
}

/// [`Decoder`] backed by a `vte` parser and `encoding_rs` transcoding.
///
/// Shift-out (SO) switches to the alternate encoding, shift-in (SI) back to
/// the primary one. Incomplete multi-byte characters and escape sequences
/// are held across flushes.
pub struct VteDecoder {
    terminal: Arc<dyn Terminal>,
    parser: Parser,
    collector: Collector,
    capture: Capture,
    primary: &'static Encoding,
    alternate: &'static Encoding,
    shifted: bool,
    transcoder: encoding_rs::Decoder,
    scratch: String,
}

impl VteDecoder {
    /// Create a UTF-8 decoder writing to `terminal`.
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self {
            terminal,
            parser: Parser::new(),
            collector: Collector::default(),
            capture: Capture::Ground,
            primary: encoding_rs::UTF_8,
            alternate: encoding_rs::UTF_8,
            shifted: false,
            transcoder: encoding_rs::UTF_8.new_decoder_without_bom_handling(),
            scratch: String::new(),
        }
    }

    /// The encoding currently in effect.
    pub fn active_encoding(&self) -> &'static Encoding {
        if self.shifted {
            self.alternate
        } else {
            self.primary
        }
    }

    fn shift(&mut self, to_alternate: bool) {
        if self.shifted == to_alternate {
            return;
        }
        self.finish_transcoder();
        self.shifted = to_alternate;
        self.transcoder = self.active_encoding().new_decoder_without_bom_handling();
        trace!("decoder: shifted to {}", self.active_encoding().name());
    }

    /// Flush bytes left in the current transcoder (as replacement characters).
    fn finish_transcoder(&mut self) {
        self.transcode(&[], true);
    }

    fn transcode(&mut self, bytes: &[u8], last: bool) {
        if bytes.is_empty() && !last {
            return;
        }

        let mut text = mem::take(&mut self.scratch);
        text.clear();

        let mut src = bytes;
        loop {
            let needed = self
                .transcoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len() * 3 + 16);
            text.reserve(needed);

            let (result, read, _) = self.transcoder.decode_to_string(src, &mut text, last);
            src = &src[read..];
            if let CoderResult::InputEmpty = result {
                break;
            }
        }

        self.advance(text.as_bytes());
        self.scratch = text;
    }

    fn advance(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            if let Capture::Ground = self.capture {
                match memchr(ESC, rest) {
                    None => {
                        self.parser.advance(&mut self.collector, rest);
                        return;
                    }
                    Some(pos) => {
                        self.parser.advance(&mut self.collector, &rest[..pos]);
                        self.capture = Capture::Escape;
                        rest = &rest[pos + 1..];
                        continue;
                    }
                }
            }

            let byte = rest[0];
            rest = &rest[1..];
            self.capture_byte(byte);
        }
    }

    fn capture_byte(&mut self, byte: u8) {
        self.capture = match mem::replace(&mut self.capture, Capture::Ground) {
            Capture::Ground => {
                self.parser.advance(&mut self.collector, &[byte]);
                Capture::Ground
            }
            Capture::Escape => match byte {
                b'^' => Capture::String(ControlKind::Pm, Vec::new()),
                b'_' => Capture::String(ControlKind::Apc, Vec::new()),
                _ => {
                    self.parser.advance(&mut self.collector, &[ESC, byte]);
                    Capture::Ground
                }
            },
            Capture::String(kind, mut buf) => match byte {
                BEL => {
                    self.end_string(kind, &buf);
                    Capture::Ground
                }
                ESC => Capture::StringEscape(kind, buf),
                _ => {
                    if buf.len() < MAX_CONTROL_STRING {
                        buf.push(byte);
                    }
                    Capture::String(kind, buf)
                }
            },
            Capture::StringEscape(kind, buf) => {
                self.end_string(kind, &buf);
                if byte == b'\\' {
                    Capture::Ground
                } else {
                    // ESC cancels the string and starts a new sequence
                    self.capture = Capture::Escape;
                    self.capture_byte(byte);
                    return;
                }
            }
        };
    }

    fn end_string(&mut self, kind: ControlKind, data: &[u8]) {
        self.collector
            .push_control(kind, String::from_utf8_lossy(data).into_owned());
    }
}

impl std::fmt::Debug for VteDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VteDecoder")
            .field("primary", &self.primary.name())
            .field("alternate", &self.alternate.name())
            .field("shifted", &self.shifted)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Decoder for VteDecoder {
    fn set_encoding(&mut self, primary: &str, alternate: &str) -> Result<(), ConfigError> {
        let primary = resolve_encoding(primary)?;
        let alternate = resolve_encoding(alternate)?;

        self.finish_transcoder();
        self.primary = primary;
        self.alternate = alternate;
        self.shifted = false;
        self.transcoder = primary.new_decoder_without_bom_handling();
        trace!(
            "decoder: encoding set to {} / {}",
            primary.name(),
            alternate.name()
        );
        Ok(())
    }

    fn feed_byte(&mut self, byte: u8) {
        self.feed(&[byte]);
    }

    fn feed(&mut self, bytes: &[u8]) {
        let mut start = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            if byte == SO || byte == SI {
                self.transcode(&bytes[start..i], false);
                self.shift(byte == SO);
                start = i + 1;
            }
        }
        self.transcode(&bytes[start..], false);
    }

    async fn flush(&mut self, hook: &mut dyn ChunkHook) {
        for event in self.collector.drain() {
            match event {
                Event::Text(text) => {
                    let text = hook.on_chunk(text).await;
                    if !text.is_empty() {
                        self.terminal.write(&text).await;
                    }
                }
                Event::Control(ControlKind::Dcs, data) => self.terminal.dcs(&data).await,
                Event::Control(ControlKind::Osc, data) => self.terminal.osc(&data).await,
                Event::Control(ControlKind::Pm, data) => self.terminal.pm(&data).await,
                Event::Control(ControlKind::Apc, data) => self.terminal.apc(&data).await,
            }
        }
    }
}
