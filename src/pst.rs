use crate::config::{READPST_BIN, SYMBOL_MAILBOX};
use crate::layout;
use crate::protocol::ProtocolWriter;
use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `-D` keeps deleted items, `-w` overwrites earlier output.
pub fn readpst_args(file: &Path, out_dir: &Path, jobs: u32) -> Vec<OsString> {
    vec![
        "-D".into(),
        "-w".into(),
        "-j".into(),
        jobs.to_string().into(),
        "-o".into(),
        out_dir.as_os_str().to_owned(),
        file.as_os_str().to_owned(),
    ]
}

/// Converts a PST store into mailboxes under `out_dir` and announces each one.
pub async fn extract_pst<W: Write>(
    file: &Path,
    out_dir: &Path,
    jobs: u32,
    proto: &mut ProtocolWriter<W>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    info!(file = ?file, out = ?out_dir, jobs, "Running readpst");
    let output = Command::new(READPST_BIN)
        .args(readpst_args(file, out_dir, jobs))
        .output()
        .await
        .with_context(|| format!("Failed to run '{READPST_BIN}'"))?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("readpst: {line}");
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        warn!("readpst: {line}");
    }

    if !output.status.success() {
        bail!("readpst exited with status {} for {}", output.status, file.display());
    }

    announce_outputs(out_dir, proto)
}

/// Emits `#` and an `extract:` directive for every file under `out_dir`.
pub fn announce_outputs<W: Write>(
    out_dir: &Path,
    proto: &mut ProtocolWriter<W>,
) -> Result<Vec<PathBuf>> {
    let produced = layout::collect_files(&[out_dir.to_path_buf()])?;
    for path in &produced {
        proto.symbol(SYMBOL_MAILBOX)?;
        proto.extract(path)?;
    }
    info!(mailboxes = produced.len(), "PST converted");
    Ok(produced)
}
