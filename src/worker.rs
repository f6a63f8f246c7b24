//! A single worker: replays its slice of the corpus and keeps its own counters.

use crate::corpus::Corpus;
use crate::error::CallError;
use crate::model::{CallOutcome, Config, Mode};
use crate::stats::WorkerStats;
use chrono::Utc;
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const CONTENT_TYPE_XML: &str = "text/xml; charset=utf-8";

/// POSTs one payload and returns the response body.
///
/// Any response that arrives in time is returned as `Ok`, whatever its status
/// code, so the caller can look for the success marker in SOAP faults too.
pub async fn execute_call(
    client: &Client,
    url: &str,
    payload: String,
    timeout: Duration,
) -> Result<String, CallError> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, CONTENT_TYPE_XML)
        .timeout(timeout)
        .body(payload)
        .send()
        .await
        .map_err(|e| CallError::classify_reqwest(&e))?;

    response
        .text()
        .await
        .map_err(|e| CallError::classify_reqwest(&e))
}

/// Replays one slice of the corpus, once or until cancelled.
pub struct Worker {
    stats: WorkerStats,
    config: Arc<Config>,
    corpus: Arc<Corpus>,
    range: Range<usize>,
    client: Client,
    rng: StdRng,
    progress: ProgressBar,
}

impl Worker {
    pub fn new(
        rank: usize,
        config: Arc<Config>,
        corpus: Arc<Corpus>,
        range: Range<usize>,
        client: Client,
        progress: ProgressBar,
    ) -> Self {
        Self {
            stats: WorkerStats::new(format!("worker-{rank}")),
            config,
            corpus,
            range,
            client,
            rng: StdRng::from_rng(&mut rand::rng()),
            progress,
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Runs to completion (finite) or until `cancel` fires, and hands back
    /// the final counters.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerStats {
        info!(slice = self.range.len(), "worker starting");

        match self.config.mode {
            Mode::Finite => {
                self.pass(&cancel).await;
            }
            Mode::Infinite if self.range.is_empty() => {
                warn!("empty slice, idling until cancelled");
                cancel.cancelled().await;
            }
            Mode::Infinite => while self.pass(&cancel).await {},
        }

        info!("stopping: {}", self.stats.snapshot());
        self.stats
    }

    /// One traversal of the slice. Returns `false` once cancelled.
    async fn pass(&mut self, cancel: &CancellationToken) -> bool {
        self.stats.loop_count += 1;
        let pass = self.stats.loop_count;
        info!(pass, "starting loop");
        let begin = Utc::now();

        let corpus = Arc::clone(&self.corpus);
        for body in corpus.slice(self.range.clone()) {
            let payload = corpus.template.render(body);
            let start = Instant::now();
            let result = tokio::select! {
                result = execute_call(
                    &self.client,
                    &self.config.url,
                    payload,
                    self.config.request_timeout,
                ) => result,
                _ = cancel.cancelled() => {
                    info!(pass, "cancelled mid-loop");
                    return false;
                }
            };
            self.observe(result, start.elapsed());
        }

        let took = (Utc::now() - begin).num_milliseconds() as f64 / 1000.0;
        info!(pass, "loop {pass} done, execute time was {took:.2} seconds");
        !cancel.is_cancelled()
    }

    fn observe(&mut self, result: Result<String, CallError>, elapsed: Duration) {
        let outcome = CallOutcome::classify(&result, &self.config.success_marker);
        match &result {
            Ok(body) if outcome == CallOutcome::BadReply => debug!(reply = %body, "bad response"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "call failed"),
        }

        self.stats.record(outcome, elapsed);
        self.progress.inc(1);

        if self.config.mode == Mode::Finite {
            debug!("{}", ".".repeat((self.stats.total_calls % 100) as usize));
        }
        if self
            .config
            .report_policy
            .should_report(self.stats.total_calls, &mut self.rng)
        {
            let snapshot = self.stats.take_snapshot();
            info!("{snapshot}");
        }
    }
}
