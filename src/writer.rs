use crate::config::{BOUNDARY_PREFIX, MAX_HEADER_BYTES, TEMP_SUFFIX};
use crate::identity::{self, HeaderSet, Identity};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Envelope,
    Headers,
    Done,
}

/// Collects the header block of a message while its bytes stream past.
///
/// The capture is always a prefix of the header block: the first line that would
/// cross [`MAX_HEADER_BYTES`] ends it.
#[derive(Debug)]
struct HeaderCapture {
    state: CaptureState,
    raw: Vec<u8>,
    truncated: bool,
}

impl HeaderCapture {
    fn new() -> Self {
        Self {
            state: CaptureState::Envelope,
            raw: Vec::new(),
            truncated: false,
        }
    }

    fn feed(&mut self, line: &[u8]) {
        if self.state == CaptureState::Envelope {
            self.state = CaptureState::Headers;
            if line.starts_with(BOUNDARY_PREFIX) {
                return;
            }
        }
        if self.state != CaptureState::Headers {
            return;
        }
        if matches!(line, b"\n" | b"\r\n") {
            self.state = CaptureState::Done;
        } else if self.raw.len() + line.len() > MAX_HEADER_BYTES {
            self.state = CaptureState::Done;
            self.truncated = true;
        } else {
            self.raw.extend_from_slice(line);
        }
    }
}

/// A message being written under a temporary name.
///
/// Dropping it without calling [`PendingMessage::close`] leaves the temporary
/// file behind under its `*.tmp.eml` name; it is never renamed.
pub struct PendingMessage {
    dir: PathBuf,
    temp_path: PathBuf,
    file: BufWriter<File>,
    headers: HeaderCapture,
    bytes: u64,
}

impl PendingMessage {
    /// Creates the temporary file right away; the identity is not known yet.
    pub fn create(dir: &Path) -> Result<Self> {
        let temp_path = dir.join(format!("{}{}", Uuid::new_v4(), TEMP_SUFFIX));
        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp message file: {:?}", temp_path))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            temp_path,
            file: BufWriter::new(file),
            headers: HeaderCapture::new(),
            bytes: 0,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.headers.feed(line);
        self.file
            .write_all(line)
            .with_context(|| format!("Failed to write message: {:?}", self.temp_path))?;
        self.bytes += line.len() as u64;
        Ok(())
    }

    /// Flushes the bytes to disk and resolves the identity.
    pub fn close(self) -> Result<ClosedMessage> {
        let file = self
            .file
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to flush message: {:?}", self.temp_path))?;
        file.sync_data()
            .with_context(|| format!("Failed to sync message: {:?}", self.temp_path))?;
        drop(file);

        if self.headers.truncated {
            warn!(
                temp = ?self.temp_path,
                kept = self.headers.raw.len(),
                "Header block exceeds capture limit, identity uses the leading headers only"
            );
        }
        let headers = HeaderSet::parse(&self.headers.raw);
        let identity = identity::resolve(&headers);

        Ok(ClosedMessage {
            dir: self.dir,
            temp_path: self.temp_path,
            headers,
            identity,
            bytes: self.bytes,
        })
    }
}

/// Fully written message with a resolved identity, still under its temporary name.
#[derive(Debug)]
pub struct ClosedMessage {
    dir: PathBuf,
    temp_path: PathBuf,
    headers: HeaderSet,
    identity: Identity,
    bytes: u64,
}

impl ClosedMessage {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> PathBuf {
        self.dir.join(format!("{}.eml", self.identity))
    }

    /// Reads the message bytes back for rendering.
    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.temp_path)
            .with_context(|| format!("Failed to read message: {:?}", self.temp_path))
    }

    /// Renames the temporary file to `<identity>.eml`. This is the only point at
    /// which the message becomes visible under its final name; an existing file of
    /// the same name is replaced.
    pub fn commit(self) -> Result<PathBuf> {
        let final_path = self.final_path();
        fs::rename(&self.temp_path, &final_path)
            .with_context(|| format!("Failed to rename temp message to: {:?}", final_path))?;
        Ok(final_path)
    }

    /// Removes the temporary file without committing.
    pub fn discard(self) -> Result<()> {
        fs::remove_file(&self.temp_path)
            .with_context(|| format!("Failed to remove temp message: {:?}", self.temp_path))
    }
}
