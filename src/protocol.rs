//! Line protocol spoken by worker processes on stdout.
//!
//! - any character outside a directive line is a progress symbol
//! - `extract:<path>` on a line of its own announces a newly written file
//! - stderr carries free-text diagnostics; any stderr output marks the job failed
//!
//! The orchestrator decodes the stream incrementally so symbols show up as soon as
//! they are written, without waiting for a newline.

use crate::config::{PROTOCOL_ENV, PROTOCOL_VERSION};
use anyhow::{bail, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DIRECTIVE_PREFIX: &[u8] = b"extract:";

/// Fails when the orchestrator that spawned this worker speaks a different version.
pub fn check_version() -> Result<()> {
    match std::env::var(PROTOCOL_ENV) {
        Ok(value) if value.trim() != PROTOCOL_VERSION.to_string() => bail!(
            "Protocol version mismatch: orchestrator speaks {}, worker speaks {}",
            value.trim(),
            PROTOCOL_VERSION
        ),
        _ => Ok(()),
    }
}

/// Worker side of the protocol. Every write is flushed immediately.
pub struct ProtocolWriter<W: Write> {
    out: W,
}

impl<W: Write> ProtocolWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn symbol(&mut self, symbol: char) -> io::Result<()> {
        write!(self.out, "{symbol}")?;
        self.out.flush()
    }

    /// The leading newline ends any pending run of symbols so the directive
    /// starts a line.
    pub fn extract(&mut self, path: &Path) -> io::Result<()> {
        write!(self.out, "\nextract:{}\n", path.display())?;
        self.out.flush()
    }

    /// Free-form text for humans; only ever called when not running under an
    /// orchestrator.
    pub fn text(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    Symbol(char),
    Extract(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineState {
    Start,
    /// Bytes read so far are a proper prefix of `extract:`
    Undecided(usize),
    Symbols,
    Directive(Vec<u8>),
}

/// Incremental decoder for the orchestrator side.
#[derive(Debug)]
pub struct ProtocolDecoder {
    state: LineState,
}

impl Default for ProtocolDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolDecoder {
    pub fn new() -> Self {
        Self {
            state: LineState::Start,
        }
    }

    pub fn feed(&mut self, chunk: &[u8], events: &mut Vec<ProtocolEvent>) {
        for &byte in chunk {
            if byte == b'\n' {
                self.end_line(events);
                continue;
            }
            self.state = match std::mem::replace(&mut self.state, LineState::Start) {
                LineState::Start if byte == DIRECTIVE_PREFIX[0] => LineState::Undecided(1),
                LineState::Start | LineState::Symbols => {
                    push_symbol(byte, events);
                    LineState::Symbols
                }
                LineState::Undecided(matched) if byte == DIRECTIVE_PREFIX[matched] => {
                    if matched + 1 == DIRECTIVE_PREFIX.len() {
                        LineState::Directive(Vec::new())
                    } else {
                        LineState::Undecided(matched + 1)
                    }
                }
                LineState::Undecided(matched) => {
                    for &b in &DIRECTIVE_PREFIX[..matched] {
                        push_symbol(b, events);
                    }
                    push_symbol(byte, events);
                    LineState::Symbols
                }
                LineState::Directive(mut path) => {
                    path.push(byte);
                    LineState::Directive(path)
                }
            };
        }
    }

    /// Flushes a trailing line that was never terminated.
    pub fn finish(&mut self, events: &mut Vec<ProtocolEvent>) {
        self.end_line(events);
    }

    fn end_line(&mut self, events: &mut Vec<ProtocolEvent>) {
        match std::mem::replace(&mut self.state, LineState::Start) {
            LineState::Undecided(matched) => {
                for &b in &DIRECTIVE_PREFIX[..matched] {
                    push_symbol(b, events);
                }
            }
            LineState::Directive(path) => {
                let path = String::from_utf8_lossy(&path);
                let path = path.trim();
                if !path.is_empty() {
                    events.push(ProtocolEvent::Extract(PathBuf::from(path)));
                }
            }
            LineState::Start | LineState::Symbols => {}
        }
    }
}

fn push_symbol(byte: u8, events: &mut Vec<ProtocolEvent>) {
    if byte.is_ascii() && !byte.is_ascii_whitespace() && !byte.is_ascii_control() {
        events.push(ProtocolEvent::Symbol(byte as char));
    }
}

/// Decodes a complete buffer in one go.
pub fn decode(bytes: &[u8]) -> Vec<ProtocolEvent> {
    let mut decoder = ProtocolDecoder::new();
    let mut events = Vec::new();
    decoder.feed(bytes, &mut events);
    decoder.finish(&mut events);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(events: &[ProtocolEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::Symbol(c) => Some(*c),
                ProtocolEvent::Extract(_) => None,
            })
            .collect()
    }

    fn extracts(events: &[ProtocolEvent]) -> Vec<PathBuf> {
        events
            .iter()
            .filter_map(|e| match e {
                ProtocolEvent::Extract(p) => Some(p.clone()),
                ProtocolEvent::Symbol(_) => None,
            })
            .collect()
    }

    #[test]
    fn decodes_symbols_and_directives() {
        let events = decode(b",,,\nextract:/out/a.pdf\n+.\n");
        assert_eq!(symbols(&events), ",,,+.");
        assert_eq!(extracts(&events), vec![PathBuf::from("/out/a.pdf")]);
    }

    #[test]
    fn directive_is_never_counted_as_symbols() {
        let events = decode(b"extract:x\n");
        assert!(symbols(&events).is_empty());
    }

    #[test]
    fn directive_split_across_chunks() {
        let mut decoder = ProtocolDecoder::new();
        let mut events = Vec::new();
        decoder.feed(b"+\nextr", &mut events);
        decoder.feed(b"act:/tmp/f", &mut events);
        decoder.feed(b"ile.doc\n", &mut events);
        assert_eq!(symbols(&events), "+");
        assert_eq!(extracts(&events), vec![PathBuf::from("/tmp/file.doc")]);
    }

    #[test]
    fn symbols_stream_before_newline() {
        let mut decoder = ProtocolDecoder::new();
        let mut events = Vec::new();
        decoder.feed(b",,", &mut events);
        assert_eq!(symbols(&events), ",,");
    }

    #[test]
    fn near_miss_prefix_becomes_symbols() {
        assert_eq!(symbols(&decode(b"extra\n")), "extra");
        assert_eq!(symbols(&decode(b"ext")), "ext");
    }

    #[test]
    fn prefix_mid_line_is_symbols() {
        let events = decode(b",extract:nope\n");
        assert!(extracts(&events).is_empty());
        assert_eq!(symbols(&events), ",extract:nope");
    }

    #[test]
    fn whitespace_and_empty_lines_are_ignored() {
        let events = decode(b"\n\n , \r\n\n");
        assert_eq!(symbols(&events), ",");
    }

    #[test]
    fn unterminated_directive_is_flushed() {
        assert_eq!(extracts(&decode(b"extract:last")), vec![PathBuf::from("last")]);
    }

    #[test]
    fn empty_directive_is_dropped() {
        assert!(decode(b"extract:\n").is_empty());
    }

    #[test]
    fn writer_output_round_trips_through_decoder() {
        let mut writer = ProtocolWriter::new(Vec::new());
        writer.symbol(',').unwrap();
        writer.symbol('+').unwrap();
        writer.extract(Path::new("/o/id/a.txt")).unwrap();
        writer.symbol('.').unwrap();

        let bytes = writer.into_inner();
        let events = decode(&bytes);
        assert_eq!(
            events,
            vec![
                ProtocolEvent::Symbol(','),
                ProtocolEvent::Symbol('+'),
                ProtocolEvent::Extract(PathBuf::from("/o/id/a.txt")),
                ProtocolEvent::Symbol('.'),
            ]
        );
    }
}
