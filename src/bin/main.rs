use update_load_tester::*;

use anyhow::Context;
use clap::Parser;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the update service
    #[arg(default_value = model::DEFAULT_URL)]
    url: String,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = model::DEFAULT_THREAD_COUNT)]
    threads: usize,

    /// Run one pass per worker, or loop until stopped
    #[arg(short, long, value_enum, default_value_t = Mode::Finite)]
    mode: Mode,

    /// Per-request timeout in seconds [default: 60 finite, 120 infinite]
    #[arg(long)]
    timeout: Option<u64>,

    /// Substring of the response body that marks a successful update
    /// [default: <ns1:updateStatus>ok</ns1:updateStatus> finite,
    /// <updateStatus>ok</updateStatus> infinite]
    #[arg(long)]
    marker: Option<String>,

    /// Directory holding header.txt, bodies.txt and footer.txt
    #[arg(short, long, default_value = "files")]
    files: PathBuf,

    /// Header file, overriding <FILES>/header.txt
    #[arg(long)]
    header: Option<PathBuf>,

    /// Bodies file, one request body per line, overriding <FILES>/bodies.txt
    #[arg(long)]
    bodies: Option<PathBuf>,

    /// Footer file, overriding <FILES>/footer.txt
    #[arg(long)]
    footer: Option<PathBuf>,

    /// Log a summary every N calls per worker
    #[arg(long, conflicts_with = "report_one_in")]
    report_every: Option<u64>,

    /// Log a summary with probability 1/K after each call
    #[arg(long)]
    report_one_in: Option<u32>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Print the final summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::for_mode(self.mode);
        config.thread_count = self.threads;
        config.url = self.url.clone();
        if let Some(marker) = &self.marker {
            config.success_marker = marker.clone();
        }
        if let Some(secs) = self.timeout {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.report_every {
            config.report_policy = ReportPolicy::Every(n);
        } else if let Some(one_in) = self.report_one_in {
            config.report_policy = ReportPolicy::Sampled { one_in };
        }
        config
    }

    fn load_corpus(&self) -> Result<Corpus, LoadError> {
        let path = |given: &Option<PathBuf>, name: &str| {
            given.clone().unwrap_or_else(|| self.files.join(name))
        };
        Corpus::load(
            &path(&self.header, corpus::HEADER_FILE),
            &path(&self.bodies, corpus::BODIES_FILE),
            &path(&self.footer, corpus::FOOTER_FILE),
        )
    }
}

fn seconds_to_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Log writer that hides the progress bar while a line is printed.
struct ProgressWriter(ProgressBar);

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.suspend(|| io::stderr().flush())
    }
}

/// Finite runs on a terminal get a bar; its length is set once the corpus
/// is partitioned.
fn progress_bar(mode: Mode) -> ProgressBar {
    if mode != Mode::Finite || !Term::stderr().is_term() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(sty) = ProgressStyle::with_template("{spinner} {elapsed_precise} {pos}/{len} calls")
    {
        pb.set_style(sty);
    }
    pb
}

async fn handle_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl_c handler");
        return;
    }
    info!("received Ctrl+C, stopping workers");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("received second Ctrl+C, aborting");
        std::process::exit(1);
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {} mode, {} elapsed",
        style("run finished:").bold(),
        match summary.mode {
            Mode::Finite => "finite",
            Mode::Infinite => "infinite",
        },
        seconds_to_hms(summary.elapsed_secs as u64)
    );
    for snapshot in &summary.workers {
        println!("  {:<10} loops {:>4}  {snapshot}", snapshot.name, snapshot.loop_count);
    }
    println!(
        "total: {} calls / {} / {} / {} / {} - {:.2} calls/s",
        summary.total_calls(),
        style(format!("{} ok", summary.ok())).green(),
        style(format!("{} failed", summary.failed())).yellow(),
        style(format!("{} timeout", summary.timeouts())).red(),
        style(format!("{} errors", summary.errors())).red(),
        summary.throughput()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let pb = progress_bar(args.mode);
    let log_pb = pb.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(move || ProgressWriter(log_pb.clone()))
        .init();

    let corpus = args.load_corpus().context("loading request corpus")?;
    info!(lines = corpus.len(), "corpus loaded");

    let runner = Runner::new(args.config(), corpus)?;

    let cancel = CancellationToken::new();
    tokio::spawn(handle_ctrl_c(cancel.clone()));
    if let Some(secs) = args.duration {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("duration of {secs}s reached, stopping workers");
            cancel.cancel();
        });
    }

    pb.set_length(runner.calls_per_pass());
    let summary = runner.run(cancel, pb).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}
