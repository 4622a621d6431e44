use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mailsift::config::{
    self, SYMBOL_ATTACHMENT, SYMBOL_EML, SYMBOL_MAILBOX, SYMBOL_TEXT, SYMBOL_UNKNOWN_TYPE,
};
use mailsift::demux::{self, DumpModes};
use mailsift::job::ProcessLauncher;
use mailsift::orchestrator::{self, Orchestrator, OrchestratorConfig};
use mailsift::protocol::{self, ProtocolWriter};
use mailsift::render::RenderOptions;
use mailsift::text::{self, TextOutcome};
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "mailsift")]
#[command(about = "Extract messages, text and attachments from email archives")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every archive under the given paths in parallel
    Extract(ExtractArgs),
    /// Split one mbox archive (optionally .bz2) into messages
    Mbox(MboxArgs),
    /// Dump plain text and attachments of one .eml message
    Eml(EmlArgs),
    /// Convert one document to plain text
    Text(TextArgs),
    /// Convert one PST store into mbox files with readpst
    Pst(PstArgs),
}

#[derive(Args, Clone, Copy)]
struct DumpArgs {
    /// Write each message as <message-id>.eml (default when no dump is selected)
    #[arg(long)]
    eml: bool,

    /// Write a plain-text rendering of each message
    #[arg(long)]
    plain_text: bool,

    /// Write attachments to <message-id>/<name>
    #[arg(long)]
    attachments: bool,
}

impl DumpArgs {
    fn modes(self) -> DumpModes {
        DumpModes {
            eml: self.eml,
            plain_text: self.plain_text,
            attachments: self.attachments,
        }
    }
}

#[derive(Args)]
struct ExtractArgs {
    /// Archive files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "extract")]
    out: PathBuf,

    /// Maximum concurrent jobs (default: 2 x cores - 1)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Maximum concurrent readpst jobs (default: cores / 2 - 1)
    #[arg(long)]
    heavy_concurrency: Option<usize>,

    /// Feed files written by jobs back in as new jobs
    #[arg(short, long)]
    recursive: bool,

    #[command(flatten)]
    dump: DumpArgs,

    /// Parallelism passed to readpst
    #[arg(long, default_value_t = config::DEFAULT_READPST_JOBS)]
    readpst_jobs: u32,

    /// Kill jobs running longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Minimum seconds between stats snapshots
    #[arg(long, default_value_t = config::REPORT_INTERVAL.as_secs())]
    report_interval: u64,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct MboxArgs {
    /// mbox archive
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    #[command(flatten)]
    dump: DumpArgs,

    /// Protocol output only
    #[arg(short, long)]
    silent: bool,
}

#[derive(Args)]
struct EmlArgs {
    /// Message file
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Write a plain-text rendering
    #[arg(long)]
    plain_text: bool,

    /// Write attachments
    #[arg(long)]
    attachments: bool,

    /// Protocol output only
    #[arg(short, long)]
    silent: bool,
}

#[derive(Args)]
struct TextArgs {
    /// Document to convert
    file: PathBuf,

    /// Output text file
    #[arg(short, long)]
    out: PathBuf,

    /// Protocol output only
    #[arg(short, long)]
    silent: bool,
}

#[derive(Args)]
struct PstArgs {
    /// PST store
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Parallelism passed to readpst
    #[arg(short, long, default_value_t = config::DEFAULT_READPST_JOBS)]
    jobs: u32,

    /// Protocol output only
    #[arg(short, long)]
    silent: bool,
}

fn legend() -> String {
    format!(
        "Legend: '{SYMBOL_EML}' message  '{SYMBOL_TEXT}' text  '{SYMBOL_ATTACHMENT}' attachment  \
         '{SYMBOL_UNKNOWN_TYPE}' unsupported type  '{SYMBOL_MAILBOX}' mailbox\n"
    )
}

/// Protocol writer on stdout; checks the version and prints the legend for humans.
fn worker_output(silent: bool) -> Result<ProtocolWriter<Stdout>> {
    protocol::check_version()?;
    let mut proto = ProtocolWriter::new(io::stdout());
    if !silent {
        proto.text(&legend())?;
    }
    Ok(proto)
}

fn finish_line(proto: &mut ProtocolWriter<Stdout>, silent: bool) -> Result<()> {
    if !silent {
        proto.text("\n")?;
    }
    Ok(())
}

fn run_extract(args: ExtractArgs) -> Result<ExitCode> {
    let mut config = OrchestratorConfig::new(args.out.clone());
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if let Some(n) = args.heavy_concurrency {
        config.heavy_concurrency = n;
    }
    config.recursive = args.recursive;
    config.job_timeout = args.timeout.map(Duration::from_secs);
    config.report_interval = Duration::from_secs(args.report_interval);
    config.show_progress = !args.no_progress;

    let launcher = ProcessLauncher::current_exe(args.dump.modes(), args.readpst_jobs)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("mailsift-orchestrator")
        .enable_io()
        .enable_time()
        .build()
        .context("Failed to build runtime")?;

    let driver = Orchestrator::new(config, Arc::new(launcher));
    let summary = rt.block_on(driver.run(&args.inputs))?;
    orchestrator::print_summary(&summary, &args.out);

    Ok(ExitCode::SUCCESS)
}

fn run_mbox(args: MboxArgs) -> Result<ExitCode> {
    let mut proto = worker_output(args.silent)?;
    let modes = args.dump.modes().or_default();
    let summary = demux::demux_archive(&args.file, &args.out, modes, &mut proto)?;
    finish_line(&mut proto, args.silent)?;
    info!(
        messages = summary.messages,
        bytes = summary.bytes,
        texts = summary.texts,
        attachments = summary.attachments,
        "mbox done"
    );
    Ok(ExitCode::SUCCESS)
}

fn run_eml(args: EmlArgs) -> Result<ExitCode> {
    let mut proto = worker_output(args.silent)?;
    let options = RenderOptions {
        plain_text: args.plain_text,
        attachments: args.attachments,
    };
    demux::render_eml_file(&args.file, &args.out, options, &mut proto)?;
    finish_line(&mut proto, args.silent)?;
    Ok(ExitCode::SUCCESS)
}

fn run_text(args: TextArgs) -> Result<ExitCode> {
    let mut proto = worker_output(args.silent)?;
    let outcome = text::convert(&args.file, &args.out, &mut proto)?;
    finish_line(&mut proto, args.silent)?;
    match outcome {
        TextOutcome::Converted(_) => Ok(ExitCode::SUCCESS),
        TextOutcome::UnsupportedType => Ok(ExitCode::from(1)),
    }
}

fn run_pst(args: PstArgs) -> Result<ExitCode> {
    let mut proto = worker_output(args.silent)?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    rt.block_on(mailsift::pst::extract_pst(&args.file, &args.out, args.jobs, &mut proto))?;
    finish_line(&mut proto, args.silent)?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Mbox(args) => run_mbox(args),
        Commands::Eml(args) => run_eml(args),
        Commands::Text(args) => run_text(args),
        Commands::Pst(args) => run_pst(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
