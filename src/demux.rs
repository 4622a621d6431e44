use crate::config::SYMBOL_EML;
use crate::identity::{self, HeaderSet};
use crate::protocol::ProtocolWriter;
use crate::render::{self, RenderOptions};
use crate::scanner::{open_archive, MboxScanner, ScanEvent};
use crate::writer::{ClosedMessage, PendingMessage};
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// What to produce for every message. The flags are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpModes {
    pub eml: bool,
    pub plain_text: bool,
    pub attachments: bool,
}

impl DumpModes {
    /// Raw `.eml` dump when nothing was selected.
    pub fn or_default(self) -> Self {
        if self.eml || self.plain_text || self.attachments {
            self
        } else {
            Self {
                eml: true,
                ..self
            }
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            plain_text: self.plain_text,
            attachments: self.attachments,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemuxSummary {
    pub messages: u64,
    pub committed: u64,
    pub fallback_identities: u64,
    pub texts: u64,
    pub attachments: u64,
    pub bytes: u64,
}

/// Splits one archive into per-message artifacts under `out_dir`.
pub fn demux_archive<W: Write>(
    archive: &Path,
    out_dir: &Path,
    modes: DumpModes,
    proto: &mut ProtocolWriter<W>,
) -> Result<DemuxSummary> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    info!(archive = ?archive, out = ?out_dir, "Demultiplexing archive");
    let reader = open_archive(archive)?;
    let summary = demux_stream(reader, out_dir, modes, proto)
        .with_context(|| format!("Failed to demultiplex: {}", archive.display()))?;

    info!(
        messages = summary.messages,
        committed = summary.committed,
        fallback = summary.fallback_identities,
        "Archive done"
    );
    Ok(summary)
}

/// Messages are committed strictly in source order. A read or write error aborts the
/// scan; the message in flight stays behind as an orphaned temporary file.
pub fn demux_stream<R: BufRead, W: Write>(
    reader: R,
    out_dir: &Path,
    modes: DumpModes,
    proto: &mut ProtocolWriter<W>,
) -> Result<DemuxSummary> {
    let mut scanner = MboxScanner::new(reader);
    let mut pending: Option<PendingMessage> = None;
    let mut summary = DemuxSummary::default();

    while let Some(event) = scanner.next_event()? {
        match event {
            ScanEvent::MessageStart => {
                pending = Some(PendingMessage::create(out_dir)?);
            }
            ScanEvent::Data(line) => {
                if let Some(message) = pending.as_mut() {
                    message.write_line(line)?;
                }
            }
            ScanEvent::MessageEnd => {
                if let Some(message) = pending.take() {
                    finalize(message.close()?, out_dir, modes, proto, &mut summary)?;
                }
            }
        }
    }

    Ok(summary)
}

fn finalize<W: Write>(
    message: ClosedMessage,
    out_dir: &Path,
    modes: DumpModes,
    proto: &mut ProtocolWriter<W>,
    summary: &mut DemuxSummary,
) -> Result<()> {
    summary.messages += 1;
    summary.bytes += message.bytes();

    let identity = message.identity().clone();
    if identity.is_fallback() {
        summary.fallback_identities += 1;
        warn!(
            identity = %identity,
            headers = message.headers().len(),
            temp = ?message.temp_path(),
            "Message has no message-id, named by header digest"
        );
    }

    let render_options = modes.render_options();
    if render_options.any() {
        let raw = message.read()?;
        let rendered = render::render_message(&raw, &identity, out_dir, render_options, proto)?;
        summary.texts += u64::from(rendered.text.is_some());
        summary.attachments += rendered.attachments.len() as u64;
    }

    if modes.eml {
        let path = message.commit()?;
        proto.symbol(SYMBOL_EML)?;
        summary.committed += 1;
        debug!(path = ?path, "Message committed");
    } else {
        message.discard()?;
    }

    Ok(())
}

/// Renders a single `.eml` file (plain text and/or attachments) into `out_dir`.
pub fn render_eml_file<W: Write>(
    path: &Path,
    out_dir: &Path,
    options: RenderOptions,
    proto: &mut ProtocolWriter<W>,
) -> Result<render::RenderSummary> {
    let raw = fs::read(path).with_context(|| format!("Failed to read message: {}", path.display()))?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let identity = identity::resolve(&HeaderSet::parse(&raw));
    if identity.is_fallback() {
        warn!(identity = %identity, path = ?path, "Message has no message-id, named by header digest");
    }

    render::render_message(&raw, &identity, out_dir, options, proto)
}
