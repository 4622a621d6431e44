use crate::config::{ARCHIVE_BUFFER_SIZE, BOUNDARY_PREFIX};
use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Opens an archive for line-oriented reading, decompressing `.bz2` on the fly.
pub fn open_archive(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open archive: {}", path.display()))?;

    let compressed = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));

    if compressed {
        Ok(Box::new(BufReader::with_capacity(
            ARCHIVE_BUFFER_SIZE,
            BzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(ARCHIVE_BUFFER_SIZE, file)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No message open yet, or the stream is exhausted
    Scanning,
    MessageOpen,
    /// A boundary line was read; the previous message has been closed and the
    /// held line opens the next one
    MessageClosing,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ScanEvent<'a> {
    MessageStart,
    /// One input line of the open message, terminator included
    Data(&'a [u8]),
    MessageEnd,
}

/// Splits an mbox byte stream into messages without buffering more than one line.
///
/// A message starts at a line beginning with `From ` that follows an empty line
/// (or the start of the stream). Line terminators are preserved, so the bytes of
/// each message are exactly the bytes between its boundary and the next one.
/// Content before the first boundary forms a message of its own unless it is blank.
pub struct MboxScanner<R> {
    reader: R,
    line: Vec<u8>,
    state: State,
    last_line_empty: bool,
    line_pending: bool,
    finished: bool,
    messages: u64,
}

impl<R: BufRead> MboxScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(1024),
            state: State::Scanning,
            last_line_empty: true,
            line_pending: false,
            finished: false,
            messages: 0,
        }
    }

    /// Number of messages opened so far.
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Pulls the next event. Returns `Ok(None)` once the stream is exhausted and the
    /// last message has been closed. A read error aborts the scan.
    pub fn next_event(&mut self) -> Result<Option<ScanEvent<'_>>> {
        loop {
            match self.state {
                State::Scanning => {
                    if self.finished || !self.read_line()? {
                        self.finished = true;
                        return Ok(None);
                    }
                    let boundary = self.is_boundary();
                    let blank = is_blank(&self.line);
                    self.last_line_empty = blank;
                    if blank && !boundary {
                        continue;
                    }
                    self.open_message();
                    return Ok(Some(ScanEvent::MessageStart));
                }
                State::MessageClosing => {
                    self.open_message();
                    return Ok(Some(ScanEvent::MessageStart));
                }
                State::MessageOpen => {
                    if self.line_pending {
                        self.line_pending = false;
                        return Ok(Some(ScanEvent::Data(&self.line)));
                    }
                    if !self.read_line()? {
                        self.finished = true;
                        self.state = State::Scanning;
                        return Ok(Some(ScanEvent::MessageEnd));
                    }
                    let boundary = self.is_boundary();
                    self.last_line_empty = is_blank(&self.line);
                    if boundary {
                        self.state = State::MessageClosing;
                        return Ok(Some(ScanEvent::MessageEnd));
                    }
                    return Ok(Some(ScanEvent::Data(&self.line)));
                }
            }
        }
    }

    fn open_message(&mut self) {
        self.state = State::MessageOpen;
        self.line_pending = true;
        self.messages += 1;
    }

    fn is_boundary(&self) -> bool {
        self.last_line_empty && self.line.starts_with(BOUNDARY_PREFIX)
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .context("Failed to read archive stream")?;
        Ok(n > 0)
    }
}

fn is_blank(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}
