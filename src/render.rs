use crate::config::{SYMBOL_ATTACHMENT, SYMBOL_TEXT};
use crate::identity::{HeaderSet, Identity};
use crate::protocol::ProtocolWriter;
use crate::text::strip_html;
use anyhow::{Context, Result};
use mail_parser::{Addr, Address, Message, MessageParser, MimeHeaders};
use rustc_hash::FxHashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub plain_text: bool,
    pub attachments: bool,
}

impl RenderOptions {
    pub fn any(&self) -> bool {
        self.plain_text || self.attachments
    }
}

#[derive(Debug, Default)]
pub struct RenderSummary {
    pub text: Option<PathBuf>,
    pub attachments: Vec<PathBuf>,
}

/// Writes the plain-text dump and/or attachments of one message under `out_dir`.
pub fn render_message<W: Write>(
    raw: &[u8],
    identity: &Identity,
    out_dir: &Path,
    options: RenderOptions,
    proto: &mut ProtocolWriter<W>,
) -> Result<RenderSummary> {
    let mut summary = RenderSummary::default();
    if !options.any() {
        return Ok(summary);
    }

    let message = MessageParser::default()
        .parse(raw)
        .with_context(|| format!("Message parser rejected message {identity}"))?;

    let names = attachment_names(&message);

    if options.attachments {
        let dir = out_dir.join(identity.as_str());
        for ((_, contents), name) in attachments(&message).into_iter().zip(&names) {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
            let path = dir.join(name);
            fs::write(&path, contents)
                .with_context(|| format!("Failed to write attachment: {:?}", path))?;
            proto.symbol(SYMBOL_ATTACHMENT)?;
            proto.extract(&path)?;
            summary.attachments.push(path);
        }
    }

    if options.plain_text {
        let path = out_dir.join(format!("{identity}.txt"));
        fs::write(&path, plain_text(&message, &names))
            .with_context(|| format!("Failed to write plain text: {:?}", path))?;
        proto.symbol(SYMBOL_TEXT)?;
        summary.text = Some(path);
    }

    Ok(summary)
}

/// Plain-text rendering of a raw message, without touching its attachments.
pub fn plain_text_from_raw(raw: &[u8]) -> Result<String> {
    let message = MessageParser::default()
        .parse(raw)
        .context("Message parser rejected message")?;
    let names = attachment_names(&message);
    Ok(plain_text(&message, &names))
}

fn attachments<'a>(message: &'a Message<'a>) -> Vec<(Option<&'a str>, &'a [u8])> {
    message
        .attachments()
        .map(|part| (part.attachment_name(), part.contents()))
        .collect()
}

/// Sanitised, unique file names for every attachment, in message order.
fn attachment_names(message: &Message<'_>) -> Vec<String> {
    let mut used = FxHashSet::default();
    attachments(message)
        .into_iter()
        .enumerate()
        .map(|(i, (name, _))| {
            let name = sanitize_file_name(name.unwrap_or_default())
                .unwrap_or_else(|| format!("attachment-{}", i + 1));
            if used.insert(name.clone()) {
                name
            } else {
                let unique = format!("{}-{}", i + 1, name);
                used.insert(unique.clone());
                unique
            }
        })
        .collect()
}

fn sanitize_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned
        .trim_start_matches(|c| c == '.' || c == '-')
        .to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn contacts(address: Option<&Address<'_>>) -> Vec<String> {
    let Some(address) = address else {
        return Vec::new();
    };
    let addrs: Vec<&Addr<'_>> = match address {
        Address::List(list) => list.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    };
    addrs.into_iter().map(format_contact).collect()
}

fn format_contact(addr: &Addr<'_>) -> String {
    match (addr.name.as_deref(), addr.address.as_deref()) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

fn body_text(message: &Message<'_>) -> String {
    let text = message
        .body_text(0)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    if !text.is_empty() {
        return text;
    }
    message
        .body_html(0)
        .map(|html| strip_html(&html))
        .unwrap_or_default()
}

fn plain_text(message: &Message<'_>, attachment_names: &[String]) -> String {
    let headers: HeaderSet = message.headers_raw().collect();

    let mut from = contacts(message.from());
    if from.is_empty() {
        from.push("unknown".to_string());
    }
    let to = contacts(message.to());
    let cc = contacts(message.cc());
    let bcc = contacts(message.bcc());

    let references: Vec<String> = headers
        .get_all("references")
        .flat_map(|value| value.split_whitespace())
        .map(str::to_string)
        .collect();

    let mut lines = vec![format!("From: {}", from.join(", "))];
    if !to.is_empty() {
        lines.push(format!("To: {}", to.join(", ")));
    }
    if !cc.is_empty() {
        lines.push(format!("Cc: {}", cc.join(", ")));
    }
    if !bcc.is_empty() {
        lines.push(format!("Bcc: {}", bcc.join(", ")));
    }
    lines.push(format!(
        "Date: {}",
        message.date().map(|d| d.to_rfc822()).unwrap_or_default()
    ));
    lines.push(format!("Subject: {}", message.subject().unwrap_or_default()));
    lines.push(String::new());
    // As written in the header, brackets included.
    lines.push(format!(
        "Message ID: {}",
        headers.get("message-id").map(str::trim).unwrap_or_default()
    ));
    if !references.is_empty() {
        lines.push(format!("References: {}", references.join(", ")));
    }
    lines.push(String::new());
    lines.push(String::new());
    lines.push(body_text(message));
    lines.push(String::new());
    lines.push(String::new());
    if !attachment_names.is_empty() {
        lines.push(format!("Attachments: {}", attachment_names.join(", ")));
    }

    lines.join("\n").trim_end().to_string()
}
