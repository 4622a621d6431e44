use crate::job::{classify, Job, JobHandle, JobKind, Launcher, Outcome};
use crate::layout::{self, OutputLayout};
use crate::protocol::{ProtocolDecoder, ProtocolEvent};
use crate::stats::{Stats, StatsSnapshot, ThrottledReporter};
use anyhow::{bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// `2 × cores − 1` archive jobs at once
pub fn default_concurrency() -> usize {
    (2 * available_cores()).saturating_sub(1).max(1)
}

/// `cores / 2 − 1` readpst jobs at once, never less than one
pub fn default_heavy_concurrency() -> usize {
    (available_cores() / 2).saturating_sub(1).max(1)
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub out_dir: PathBuf,
    pub concurrency: usize,
    pub heavy_concurrency: usize,
    pub recursive: bool,
    pub job_timeout: Option<Duration>,
    pub report_interval: Duration,
    pub show_progress: bool,
}

impl OrchestratorConfig {
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            out_dir,
            concurrency: default_concurrency(),
            heavy_concurrency: default_heavy_concurrency(),
            recursive: false,
            job_timeout: None,
            report_interval: crate::config::REPORT_INTERVAL,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dispatched: u64,
    /// `.txt` inputs and discoveries that never got a job
    pub skipped: u64,
    /// Paths offered again after their first dispatch
    pub duplicates: u64,
    pub peak_active: usize,
    pub elapsed: Duration,
    pub stats: StatsSnapshot,
}

/// What the orchestrator learned from one finished job.
#[derive(Debug)]
struct JobReport {
    job: Job,
    outcome: Outcome,
    diagnostics: String,
    exit_code: Option<i32>,
    symbols: FxHashMap<char, u64>,
    discovered: Vec<PathBuf>,
}

impl JobReport {
    fn failed(job: Job, diagnostics: String) -> Self {
        Self {
            job,
            outcome: Outcome::Error,
            diagnostics,
            exit_code: None,
            symbols: FxHashMap::default(),
            discovered: Vec::new(),
        }
    }
}

/// Drives extraction jobs over a file tree with bounded concurrency.
pub struct Orchestrator {
    config: OrchestratorConfig,
    launcher: Arc<dyn Launcher>,
    stats: Arc<Stats>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            stats: Arc::new(Stats::new()),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Runs every input to completion. Only setup problems are errors; failed jobs
    /// are counted and the run carries on.
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<RunSummary> {
        let start = Instant::now();
        if inputs.is_empty() {
            bail!("No inputs given");
        }

        let files = layout::collect_files(inputs)?;
        if files.is_empty() {
            bail!("No input files found under {:?}", inputs);
        }

        let mut anchors = files.clone();
        for input in inputs {
            anchors.push(
                fs::canonicalize(input)
                    .with_context(|| format!("Input does not exist: {}", input.display()))?,
            );
        }
        let base = layout::common_prefix(&anchors);

        fs::create_dir_all(&self.config.out_dir).with_context(|| {
            format!("Failed to create output directory: {:?}", self.config.out_dir)
        })?;
        let out_root = fs::canonicalize(&self.config.out_dir)
            .with_context(|| format!("Failed to resolve: {:?}", self.config.out_dir))?;

        info!(
            files = files.len(),
            base = ?base,
            out = ?out_root,
            concurrency = self.config.concurrency,
            heavy = self.config.heavy_concurrency,
            recursive = self.config.recursive,
            "Starting extraction"
        );

        let mut dispatcher = Dispatcher::new(
            OutputLayout::new(base, out_root),
            self.config.concurrency,
            self.config.heavy_concurrency,
        );
        for file in files {
            dispatcher.offer(file, false);
        }

        let pb = make_progress_bar(self.config.show_progress);
        pb.set_length(dispatcher.dispatched);

        let reporter = Arc::new(ThrottledReporter::new(self.config.report_interval));
        let ticker = spawn_ticker(Arc::clone(&self.stats), Arc::clone(&reporter), pb.clone());

        let mut in_flight = FuturesUnordered::new();
        let mut peak_active = 0;

        loop {
            while let Some(job) = dispatcher.admit() {
                debug!(kind = %job.kind, input = ?job.input, "Job started");
                in_flight.push(tokio::spawn(run_job(
                    Arc::clone(&self.launcher),
                    job,
                    Arc::clone(&self.stats),
                    self.config.job_timeout,
                )));
            }
            peak_active = peak_active.max(in_flight.len());

            let Some(joined) = in_flight.next().await else {
                break;
            };
            let report = joined.context("Task join error")?;
            dispatcher.release(&report.job);

            self.finish_job(&report, &pb);

            if self.config.recursive {
                for path in report.discovered {
                    let resolved = tokio::fs::canonicalize(&path).await;
                    dispatcher.offer(resolved.unwrap_or(path), true);
                }
                pb.set_length(dispatcher.dispatched);
            }

            if reporter.should_report() {
                let snapshot = self.stats.snapshot();
                pb.suspend(|| println!("{}", snapshot.render()));
            }
        }

        ticker.abort();
        pb.finish_and_clear();

        let stats = self.stats.snapshot();
        Ok(RunSummary {
            dispatched: dispatcher.dispatched,
            skipped: dispatcher.skipped,
            duplicates: dispatcher.duplicates,
            peak_active,
            elapsed: start.elapsed(),
            stats,
        })
    }

    fn finish_job(&self, report: &JobReport, pb: &ProgressBar) {
        let job = &report.job;
        self.stats.record(&job.extension, report.outcome);

        match report.outcome {
            Outcome::Error => {
                warn!("Failure {}\n{}", job.input.display(), report.diagnostics.trim_end());
            }
            Outcome::Unknown => {
                info!(input = ?job.input, exit_code = ?report.exit_code, "Job ended without diagnostics");
            }
            Outcome::Done => {
                debug!(
                    input = ?job.input,
                    symbols = ?report.symbols,
                    discovered = report.discovered.len(),
                    "Job done"
                );
            }
        }

        pb.inc(1);
        pb.set_message(self.stats.snapshot().symbol_summary());
    }
}

/// Admission state: the pending queue, the dedup set and the active counts.
struct Dispatcher {
    layout: OutputLayout,
    pending: VecDeque<Job>,
    seen: FxHashSet<PathBuf>,
    concurrency: usize,
    heavy_concurrency: usize,
    active: usize,
    heavy_active: usize,
    dispatched: u64,
    skipped: u64,
    duplicates: u64,
}

impl Dispatcher {
    fn new(layout: OutputLayout, concurrency: usize, heavy_concurrency: usize) -> Self {
        Self {
            layout,
            pending: VecDeque::new(),
            seen: FxHashSet::default(),
            concurrency: concurrency.max(1),
            heavy_concurrency: heavy_concurrency.max(1),
            active: 0,
            heavy_active: 0,
            dispatched: 0,
            skipped: 0,
            duplicates: 0,
        }
    }

    fn offer(&mut self, path: PathBuf, discovered: bool) {
        if !self.seen.insert(path.clone()) {
            self.duplicates += 1;
            return;
        }
        let Some(kind) = JobKind::route(&path, discovered) else {
            debug!(path = ?path, "Skipping text file");
            self.skipped += 1;
            return;
        };
        self.pending.push_back(Job::new(path, kind, &self.layout));
        self.dispatched += 1;
    }

    /// Next job that fits both limits, in submission order.
    fn admit(&mut self) -> Option<Job> {
        if self.active >= self.concurrency {
            return None;
        }
        let heavy_full = self.heavy_active >= self.heavy_concurrency;
        let index = self
            .pending
            .iter()
            .position(|job| !(heavy_full && job.kind.is_heavy()))?;
        let job = self.pending.remove(index)?;

        self.active += 1;
        if job.kind.is_heavy() {
            self.heavy_active += 1;
        }
        Some(job)
    }

    fn release(&mut self, job: &Job) {
        self.active = self.active.saturating_sub(1);
        if job.kind.is_heavy() {
            self.heavy_active = self.heavy_active.saturating_sub(1);
        }
    }
}

/// Everything a job wrote before it exited.
struct Exchange {
    diagnostics: Vec<u8>,
    exit_code: Option<i32>,
    symbols: FxHashMap<char, u64>,
    discovered: Vec<PathBuf>,
}

async fn run_job(
    launcher: Arc<dyn Launcher>,
    job: Job,
    stats: Arc<Stats>,
    timeout: Option<Duration>,
) -> JobReport {
    if let Some(dir) = job.output_dir() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            let diagnostics = format!("Failed to create output directory {:?}: {e}", dir);
            return JobReport::failed(job, diagnostics);
        }
    }

    let handle = match launcher.launch(&job) {
        Ok(handle) => handle,
        Err(e) => return JobReport::failed(job, format!("{e:#}")),
    };

    let exchange = match timeout {
        Some(limit) => match tokio::time::timeout(limit, drive(handle, &stats)).await {
            Ok(result) => result,
            Err(_) => {
                let diagnostics = format!("Timed out after {:.1}s", limit.as_secs_f64());
                return JobReport::failed(job, diagnostics);
            }
        },
        None => drive(handle, &stats).await,
    };

    match exchange {
        Ok(exchange) => {
            let diagnostics = String::from_utf8_lossy(&exchange.diagnostics).into_owned();
            JobReport {
                outcome: classify(&diagnostics, exchange.exit_code),
                job,
                diagnostics,
                exit_code: exchange.exit_code,
                symbols: exchange.symbols,
                discovered: exchange.discovered,
            }
        }
        Err(e) => JobReport::failed(job, format!("Lost contact with job: {e}")),
    }
}

/// Consumes both output channels to the end, then waits for the exit code.
/// Symbols reach the shared stats as soon as they are decoded.
async fn drive(handle: JobHandle, stats: &Stats) -> io::Result<Exchange> {
    let JobHandle {
        mut stdout,
        mut stderr,
        exit,
    } = handle;

    let mut symbols: FxHashMap<char, u64> = FxHashMap::default();
    let mut discovered = Vec::new();

    let read_stdout = async {
        let mut decoder = ProtocolDecoder::new();
        let mut events = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            decoder.feed(&buf[..n], &mut events);
            apply_events(&mut events, stats, &mut symbols, &mut discovered);
        }
        decoder.finish(&mut events);
        apply_events(&mut events, stats, &mut symbols, &mut discovered);
        Ok::<_, io::Error>(())
    };

    let read_stderr = async {
        let mut diagnostics = Vec::new();
        stderr.read_to_end(&mut diagnostics).await?;
        Ok::<_, io::Error>(diagnostics)
    };

    let (stdout_result, stderr_result) = tokio::join!(read_stdout, read_stderr);
    stdout_result?;
    let diagnostics = stderr_result?;
    let exit_code = exit.await?;

    Ok(Exchange {
        diagnostics,
        exit_code,
        symbols,
        discovered,
    })
}

fn apply_events(
    events: &mut Vec<ProtocolEvent>,
    stats: &Stats,
    symbols: &mut FxHashMap<char, u64>,
    discovered: &mut Vec<PathBuf>,
) {
    for event in events.drain(..) {
        match event {
            ProtocolEvent::Symbol(symbol) => {
                stats.add_symbol(symbol);
                *symbols.entry(symbol).or_insert(0) += 1;
            }
            ProtocolEvent::Extract(path) => discovered.push(path),
        }
    }
}

/// Serves snapshots that were deferred by the throttle once the interval passes.
fn spawn_ticker(
    stats: Arc<Stats>,
    reporter: Arc<ThrottledReporter>,
    pb: ProgressBar,
) -> JoinHandle<()> {
    let period = reporter.interval().max(Duration::from_millis(100));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if reporter.take_pending() && reporter.should_report() {
                let snapshot = stats.snapshot();
                pb.suspend(|| println!("{}", snapshot.render()));
            }
        }
    })
}

fn make_progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} jobs {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Prints the end-of-run report.
pub fn print_summary(summary: &RunSummary, out_dir: &Path) {
    println!("{}", summary.stats.render());
    println!();
    println!("=== Summary ===");
    println!("Output:             {}", out_dir.display());
    println!("Jobs dispatched:    {}", summary.dispatched);
    println!("Skipped (.txt):     {}", summary.skipped);
    println!("Done:               {}", summary.stats.total_done());
    println!("Errors:             {}", summary.stats.total_errors());
    println!("Unknown:            {}", summary.stats.total_unknown());
    println!("Elapsed:            {:.2}s", summary.elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Script {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        delay: Duration,
        hang: bool,
    }

    /// Replays a script per job and tracks how many jobs are alive at once.
    struct FakeLauncher {
        script: Box<dyn Fn(&Job) -> Script + Send + Sync>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        launched: Mutex<Vec<Job>>,
    }

    impl FakeLauncher {
        fn new(script: impl Fn(&Job) -> Script + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                launched: Mutex::new(Vec::new()),
            })
        }

        fn launched(&self) -> Vec<Job> {
            self.launched.lock().unwrap().clone()
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, job: &Job) -> Result<JobHandle> {
            self.launched.lock().unwrap().push(job.clone());
            let script = (self.script)(job);

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let active = Arc::clone(&self.active);

            Ok(JobHandle {
                stdout: Box::new(Cursor::new(script.stdout.into_bytes())),
                stderr: Box::new(Cursor::new(script.stderr.into_bytes())),
                exit: async move {
                    if script.hang {
                        futures::future::pending::<()>().await;
                    }
                    tokio::time::sleep(script.delay).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(script.exit_code)
                }
                .boxed(),
            })
        }
    }

    fn config(out: &Path) -> OrchestratorConfig {
        OrchestratorConfig {
            out_dir: out.to_path_buf(),
            concurrency: 2,
            heavy_concurrency: 1,
            recursive: false,
            job_timeout: None,
            report_interval: Duration::from_secs(60),
            show_progress: false,
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    fn ok() -> Script {
        Script {
            exit_code: Some(0),
            ..Script::default()
        }
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        for i in 0..7 {
            touch(input.path(), &format!("box{i}.mbox"));
        }

        let launcher = FakeLauncher::new(|_| Script {
            delay: Duration::from_millis(20),
            ..ok()
        });
        let orchestrator = Orchestrator::new(config(out.path()), launcher.clone());
        let summary = orchestrator.run(&[input.path().to_path_buf()]).await.unwrap();

        assert_eq!(summary.dispatched, 7);
        assert_eq!(summary.peak_active, 2);
        assert!(launcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(orchestrator.stats().done(".mbox"), 7);
    }

    #[tokio::test]
    async fn heavy_jobs_share_a_smaller_pool() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        for i in 0..3 {
            touch(input.path(), &format!("store{i}.pst"));
        }

        let launcher = FakeLauncher::new(|_| Script {
            delay: Duration::from_millis(20),
            ..ok()
        });
        let orchestrator = Orchestrator::new(config(out.path()), launcher.clone());
        let summary = orchestrator.run(&[input.path().to_path_buf()]).await.unwrap();

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.peak_active, 1);
        assert_eq!(orchestrator.stats().done(".pst"), 3);
    }

    #[tokio::test]
    async fn diagnostics_mark_error_even_on_zero_exit() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = touch(input.path(), "bad.mbox");

        let launcher = FakeLauncher::new(|_| Script {
            stdout: ",,".to_string(),
            stderr: "corrupt header\n".to_string(),
            ..ok()
        });
        let orchestrator = Orchestrator::new(config(out.path()), launcher);
        let summary = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(summary.stats.error.get(".mbox"), Some(&1));
        assert!(summary.stats.done.is_empty());
        assert_eq!(orchestrator.stats().symbol(','), 2);
    }

    #[tokio::test]
    async fn silent_nonzero_exit_is_unknown() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = touch(input.path(), "odd.mbox");

        let launcher = FakeLauncher::new(|_| Script {
            exit_code: Some(3),
            ..Script::default()
        });
        let orchestrator = Orchestrator::new(config(out.path()), launcher);
        let summary = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(summary.stats.unknown.get(".mbox"), Some(&1));
        assert!(summary.stats.error.is_empty());
    }

    #[tokio::test]
    async fn txt_inputs_are_skipped() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        touch(input.path(), "a.pst");
        touch(input.path(), "b.mbox");
        touch(input.path(), "c.txt");

        let launcher = FakeLauncher::new(|_| ok());
        let orchestrator = Orchestrator::new(config(out.path()), launcher.clone());
        let summary = orchestrator.run(&[input.path().to_path_buf()]).await.unwrap();

        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.skipped, 1);
        let mut kinds: Vec<JobKind> = launcher.launched().iter().map(|j| j.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![JobKind::Mbox, JobKind::Pst]);
    }

    #[tokio::test]
    async fn outputs_mirror_input_tree() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(input.path().join("2019")).unwrap();
        touch(&input.path().join("2019"), "inbox.mbox");

        let launcher = FakeLauncher::new(|_| ok());
        let orchestrator = Orchestrator::new(config(out.path()), launcher.clone());
        orchestrator.run(&[input.path().to_path_buf()]).await.unwrap();

        let job = &launcher.launched()[0];
        let out_root = fs::canonicalize(out.path()).unwrap();
        assert_eq!(job.output, out_root.join("2019/inbox.mbox"));
        assert!(job.output.is_dir());
    }

    #[tokio::test]
    async fn recursive_mode_dispatches_discoveries_once() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = touch(input.path(), "a.mbox");

        let launcher = FakeLauncher::new(|job| match job.kind {
            JobKind::Mbox => {
                let attachment = job.output.join("m@x").join("report.pdf");
                Script {
                    stdout: format!(
                        ",+\nextract:{0}\n,+\nextract:{0}\n",
                        attachment.display()
                    ),
                    ..ok()
                }
            }
            _ => Script {
                stdout: ".".to_string(),
                ..ok()
            },
        });
        let mut config = config(out.path());
        config.recursive = true;
        let orchestrator = Orchestrator::new(config, launcher.clone());
        let summary = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.duplicates, 1);
        let launched = launcher.launched();
        assert_eq!(launched[1].kind, JobKind::Text);
        assert!(launched[1].output.ends_with("a.mbox/m@x/report.pdf.txt"));
        assert_eq!(orchestrator.stats().symbol('+'), 2);
        assert_eq!(orchestrator.stats().done(".pdf"), 1);
    }

    #[tokio::test]
    async fn discovered_archives_are_extracted_beside_themselves() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = touch(input.path(), "mail.pst");

        let launcher = FakeLauncher::new(|job| match job.kind {
            JobKind::Pst => {
                let mailbox = touch(&job.output, "Inbox");
                let message = touch(&job.output, "fwd.eml");
                Script {
                    stdout: format!(
                        "#\nextract:{}\n#\nextract:{}\n",
                        mailbox.display(),
                        message.display()
                    ),
                    ..ok()
                }
            }
            _ => ok(),
        });
        let mut config = config(out.path());
        config.recursive = true;
        let orchestrator = Orchestrator::new(config, launcher.clone());
        let summary = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(summary.dispatched, 3);
        assert!(summary.stats.error.is_empty());
        assert_eq!(summary.stats.done.get(".pst"), Some(&1));
        assert_eq!(summary.stats.done.get(""), Some(&1));
        assert_eq!(summary.stats.done.get(".eml"), Some(&1));

        let launched = launcher.launched();
        let mut kinds: Vec<JobKind> = launched.iter().map(|j| j.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![JobKind::Eml, JobKind::Mbox, JobKind::Pst]);
        for job in launched.iter().filter(|j| j.kind != JobKind::Pst) {
            assert!(job.input.is_file());
            assert!(job.output.is_dir());
            assert!(job.output.to_string_lossy().ends_with(".d"));
        }
    }

    #[tokio::test]
    async fn discoveries_ignored_without_recursive_flag() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let file = touch(input.path(), "a.mbox");

        let launcher = FakeLauncher::new(|_| Script {
            stdout: "+\nextract:/tmp/elsewhere/x.pdf\n".to_string(),
            ..ok()
        });
        let orchestrator = Orchestrator::new(config(out.path()), launcher.clone());
        let summary = orchestrator.run(&[file]).await.unwrap();

        assert_eq!(summary.dispatched, 1);
        assert_eq!(launcher.launched().len(), 1);
    }

    #[tokio::test]
    async fn hung_job_times_out_as_error() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        touch(input.path(), "stuck.mbox");
        touch(input.path(), "fine.mbox");

        let launcher = FakeLauncher::new(|job| Script {
            hang: job.input.ends_with("stuck.mbox"),
            ..ok()
        });
        let mut config = config(out.path());
        config.job_timeout = Some(Duration::from_millis(50));
        let orchestrator = Orchestrator::new(config, launcher);
        let summary = orchestrator.run(&[input.path().to_path_buf()]).await.unwrap();

        assert_eq!(summary.stats.error.get(".mbox"), Some(&1));
        assert_eq!(summary.stats.done.get(".mbox"), Some(&1));
    }

    #[tokio::test]
    async fn launch_failure_is_recorded_not_fatal() {
        struct Broken;
        impl Launcher for Broken {
            fn launch(&self, _job: &Job) -> Result<JobHandle> {
                bail!("no such executable")
            }
        }

        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        touch(input.path(), "a.mbox");
        touch(input.path(), "b.eml");

        let orchestrator = Orchestrator::new(config(out.path()), Arc::new(Broken));
        let summary = orchestrator.run(&[input.path().to_path_buf()]).await.unwrap();

        assert_eq!(summary.stats.error.get(".mbox"), Some(&1));
        assert_eq!(summary.stats.error.get(".eml"), Some(&1));
    }

    #[tokio::test]
    async fn missing_input_fails_the_run() {
        let out = TempDir::new().unwrap();
        let launcher = FakeLauncher::new(|_| ok());
        let orchestrator = Orchestrator::new(config(out.path()), launcher);
        assert!(orchestrator
            .run(&[PathBuf::from("/no/such/archive.mbox")])
            .await
            .is_err());
        assert!(orchestrator.run(&[]).await.is_err());
    }
}
