use crate::config::{SYMBOL_TEXT, SYMBOL_UNKNOWN_TYPE};
use crate::protocol::ProtocolWriter;
use crate::render;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

static SCRIPT_STYLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static BLOCK_BREAK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|tr|li|h[1-6]|table|blockquote)\s*>").unwrap()
});

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static BLANK_RUN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Extensions copied through as text
const TEXT_LIKE: &[&str] = &[
    "md", "csv", "json", "xml", "log", "ics", "vcf", "rtf", "text",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    Converted(PathBuf),
    UnsupportedType,
}

/// Converts HTML to readable plain text.
pub fn strip_html(html: &str) -> String {
    let text = SCRIPT_STYLE_REGEX.replace_all(html, "");
    let text = COMMENT_REGEX.replace_all(&text, "");
    let text = BLOCK_BREAK_REGEX.replace_all(&text, "\n");
    let text = TAG_REGEX.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    BLANK_RUN_REGEX
        .replace_all(lines.join("\n").trim(), "\n\n")
        .into_owned()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Converts `input` to plain text at `output`. Unsupported types emit `?` and
/// write nothing.
pub fn convert<W: Write>(
    input: &Path,
    output: &Path,
    proto: &mut ProtocolWriter<W>,
) -> Result<TextOutcome> {
    let ext = extension(input);

    let text = match ext.as_str() {
        "html" | "htm" => {
            let raw = read(input)?;
            strip_html(&String::from_utf8_lossy(&raw))
        }
        "eml" => {
            let raw = read(input)?;
            render::plain_text_from_raw(&raw)
                .with_context(|| format!("Failed to parse message: {}", input.display()))?
        }
        ext if TEXT_LIKE.contains(&ext) => String::from_utf8_lossy(&read(input)?).into_owned(),
        _ => {
            proto.symbol(SYMBOL_UNKNOWN_TYPE)?;
            return Ok(TextOutcome::UnsupportedType);
        }
    };

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    fs::write(output, text).with_context(|| format!("Failed to write text: {:?}", output))?;
    proto.symbol(SYMBOL_TEXT)?;

    Ok(TextOutcome::Converted(output.to_path_buf()))
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read: {}", path.display()))
}
