use crate::config::{PROTOCOL_ENV, PROTOCOL_VERSION, SKIPPED_EXTENSION};
use crate::demux::DumpModes;
use crate::layout::{extension_key, OutputLayout};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// mbox archive split into messages
    Mbox,
    /// PST store converted to mailboxes by readpst
    Pst,
    /// single message rendered to text/attachments
    Eml,
    /// document converted to plain text
    Text,
}

impl JobKind {
    /// Picks the job for a path, or `None` for files that are never processed.
    ///
    /// Top-level inputs are mailboxes unless recognised otherwise; files discovered
    /// mid-run are only treated as mailboxes when they look like one.
    pub fn route(path: &Path, discovered: bool) -> Option<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        match ext.as_deref() {
            Some(SKIPPED_EXTENSION) => None,
            Some("pst") => Some(Self::Pst),
            Some("eml") => Some(Self::Eml),
            _ if !discovered => Some(Self::Mbox),
            None | Some("mbox" | "mbx" | "bz2") => Some(Self::Mbox),
            Some(_) => Some(Self::Text),
        }
    }

    /// Jobs that also need a slot of the heavy-tool pool.
    pub fn is_heavy(&self) -> bool {
        matches!(self, Self::Pst)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mbox => "mbox",
            Self::Pst => "pst",
            Self::Eml => "eml",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub kind: JobKind,
    /// Directory for archive/message jobs, file for text jobs
    pub output: PathBuf,
    /// Stats key, e.g. `.mbox`
    pub extension: String,
}

impl Job {
    pub fn new(input: PathBuf, kind: JobKind, layout: &OutputLayout) -> Self {
        let output = match kind {
            JobKind::Text => layout.text_output(&input),
            JobKind::Mbox | JobKind::Pst | JobKind::Eml => layout.output_dir(&input),
        };
        let extension = extension_key(&input);
        Self {
            input,
            kind,
            output,
            extension,
        }
    }

    /// Directory that must exist before the job starts.
    pub fn output_dir(&self) -> Option<&Path> {
        match self.kind {
            JobKind::Text => self.output.parent(),
            JobKind::Mbox | JobKind::Pst | JobKind::Eml => Some(&self.output),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Done,
    Error,
    /// Non-zero exit without any diagnostic
    Unknown,
}

/// Any diagnostic output is an error regardless of the exit code.
pub fn classify(diagnostics: &str, exit_code: Option<i32>) -> Outcome {
    if !diagnostics.is_empty() {
        Outcome::Error
    } else if exit_code != Some(0) {
        Outcome::Unknown
    } else {
        Outcome::Done
    }
}

/// Output channels and completion of one launched job.
pub struct JobHandle {
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    /// Resolves to the exit code, `None` when killed by a signal
    pub exit: BoxFuture<'static, io::Result<Option<i32>>>,
}

/// Starts the external work for a job.
pub trait Launcher: Send + Sync {
    fn launch(&self, job: &Job) -> Result<JobHandle>;
}

/// Runs each job as a worker subcommand of a `mailsift` executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exe: PathBuf,
    modes: DumpModes,
    readpst_jobs: u32,
}

impl ProcessLauncher {
    pub fn new(exe: PathBuf, modes: DumpModes, readpst_jobs: u32) -> Self {
        Self {
            exe,
            modes,
            readpst_jobs,
        }
    }

    pub fn current_exe(modes: DumpModes, readpst_jobs: u32) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate own executable")?;
        Ok(Self::new(exe, modes, readpst_jobs))
    }

    pub fn args(&self, job: &Job) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![job.kind.as_str().into(), "--silent".into()];
        match job.kind {
            JobKind::Mbox => {
                let modes = self.modes.or_default();
                if modes.eml {
                    args.push("--eml".into());
                }
                if modes.plain_text {
                    args.push("--plain-text".into());
                }
                if modes.attachments {
                    args.push("--attachments".into());
                }
            }
            JobKind::Eml => {
                args.push("--plain-text".into());
                if self.modes.attachments {
                    args.push("--attachments".into());
                }
            }
            JobKind::Pst => {
                args.push("--jobs".into());
                args.push(self.readpst_jobs.to_string().into());
            }
            JobKind::Text => {}
        }
        args.push("--out".into());
        args.push(job.output.clone().into_os_string());
        args.push(job.input.clone().into_os_string());
        args
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, job: &Job) -> Result<JobHandle> {
        let mut child = Command::new(&self.exe)
            .args(self.args(job))
            .env(PROTOCOL_ENV, PROTOCOL_VERSION.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {} job for {:?}", job.kind, job.input))?;

        let stdout = child.stdout.take().context("Worker stdout not captured")?;
        let stderr = child.stderr.take().context("Worker stderr not captured")?;

        Ok(JobHandle {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit: async move { child.wait().await.map(|status| status.code()) }.boxed(),
        })
    }
}
