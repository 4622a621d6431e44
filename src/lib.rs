//! Mailsift: email archive extraction across a file tree
//!
//! This crate turns a mixture of mail archives (mbox files, optionally bz2-compressed,
//! PST stores, loose `.eml` messages) into per-message artifacts: raw `.eml` files,
//! plain-text dumps and attachments.
//!
//! 1. **Demultiplexing** -- A streaming scanner splits each mbox into messages on
//!    `From ` boundaries without loading the archive into memory; every message is
//!    named after its Message-ID (or a digest of its headers) and committed with a
//!    temp-file + rename so a final name never refers to a partial file
//! 2. **Orchestration** -- One worker process per input file, bounded to a fixed number
//!    of active jobs, with a smaller pool for the heavy `readpst` conversions
//! 3. **Recursion** -- Workers announce the files they write (`extract:<path>`); in
//!    recursive mode those are fed back as new jobs, so PST stores become mailboxes,
//!    mailboxes become messages and attachments become text
//!
//! # Job output protocol
//!
//! Workers talk to the orchestrator over stdout with single-character progress symbols
//! (`,` message, `.` text, `+` attachment, `?` unsupported type, `#` mailbox) and
//! `extract:` directives. Anything on stderr is a diagnostic and marks the job failed.
//!
//! # Key Modules
//!
//! - [`scanner`] -- mbox boundary scanner with bz2 support
//! - [`identity`] -- Header set and message identity resolution
//! - [`writer`] -- Atomic per-message file writer
//! - [`demux`] -- mbox worker: scanner + writer + renderer
//! - [`render`] -- Plain-text and attachment dumps for one message
//! - [`text`] -- Document to text conversion worker
//! - [`pst`] -- readpst wrapper worker
//! - [`protocol`] -- Worker output encoding and incremental decoding
//! - [`layout`] -- Input enumeration and output path mapping
//! - [`job`] -- Job routing, outcome classification, process launching
//! - [`orchestrator`] -- Bounded-concurrency job driver
//! - [`stats`] -- Concurrent outcome/symbol tables and throttled reporting
//! - [`config`] -- Constants
//!
//! # Example Usage
//!
//! ```bash
//! # Split a directory of archives into .eml files and plain text, following attachments
//! mailsift extract -r --eml --plain-text --attachments -o extract/ archives/
//!
//! # Run a single worker by hand
//! mailsift mbox -o out/ inbox.mbox.bz2
//! ```

pub mod config;
pub mod demux;
pub mod identity;
pub mod job;
pub mod layout;
pub mod orchestrator;
pub mod protocol;
pub mod pst;
pub mod render;
pub mod scanner;
pub mod stats;
pub mod text;
pub mod writer;
