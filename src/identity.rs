use crate::config::MAX_IDENTITY_BYTES;
use mail_parser::MessageParser;
use sha2::{Digest, Sha256};
use std::fmt;

/// Header fields of one message: lower-cased name to raw value, in encountered order.
/// Duplicate fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a raw header block (no mbox envelope line) with the message parser.
    pub fn parse(raw: &[u8]) -> Self {
        let mut headers = Self::new();
        if let Some(message) = MessageParser::default().parse_headers(raw) {
            for (name, value) in message.headers_raw() {
                headers.push(name, value.trim());
            }
        }
        headers
    }

    pub fn push(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.to_ascii_lowercase(), value.to_string()));
    }

    /// First value of `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderSet {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.push(name, value);
        }
        headers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    MessageId,
    /// SHA-256 over the header set; the message had no usable `message-id`
    HeaderDigest,
}

/// Filesystem-safe name of a message's output artifacts. Fixed once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    value: String,
    source: IdentitySource,
}

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    pub fn is_fallback(&self) -> bool {
        self.source == IdentitySource::HeaderDigest
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Resolves the identity of a message from its headers.
///
/// Uses `message-id` when present, otherwise a hex digest of every header entry.
/// An empty header set digests to a constant, so all header-less messages share
/// one identity and overwrite each other. Ids longer than [`MAX_IDENTITY_BYTES`]
/// are cut and suffixed with a digest of the full id.
pub fn resolve(headers: &HeaderSet) -> Identity {
    if let Some(id) = headers.get("message-id").map(sanitize) {
        if !id.is_empty() && id != "." && id != ".." {
            return Identity {
                value: cap_length(id),
                source: IdentitySource::MessageId,
            };
        }
    }

    Identity {
        value: sanitize(&header_digest(headers)),
        source: IdentitySource::HeaderDigest,
    }
}

fn header_digest(headers: &HeaderSet) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in headers.iter() {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn cap_length(id: String) -> String {
    if id.len() <= MAX_IDENTITY_BYTES {
        return id;
    }
    let digest = format!("{:x}", Sha256::digest(id.as_bytes()));
    let suffix = &digest[..16];

    let mut cut = MAX_IDENTITY_BYTES - suffix.len() - 1;
    while !id.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", &id[..cut], suffix)
}

/// Strips surrounding angle brackets and turns path separators into dashes.
fn sanitize(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    inner
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            '<' | '>' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
