//! Worker pool lifecycle.

use crate::corpus::{partition, Corpus};
use crate::error::LoadError;
use crate::model::Config;
use crate::stats::RunSummary;
use crate::worker::Worker;
use indicatif::ProgressBar;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

pub struct Runner {
    config: Arc<Config>,
    corpus: Arc<Corpus>,
    client: Client,
}

impl Runner {
    /// Validates the configuration and builds the pooled HTTP client shared
    /// by all workers.
    pub fn new(config: Config, corpus: Corpus) -> Result<Self, LoadError> {
        config.validate()?;
        let client = Client::builder().build()?;
        Ok(Self {
            config: Arc::new(config),
            corpus: Arc::new(corpus),
            client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of calls one finite pass will issue across all workers.
    pub fn calls_per_pass(&self) -> u64 {
        partition(self.corpus.len(), self.config.thread_count, self.config.mode)
            .iter()
            .map(|r| r.len() as u64)
            .sum()
    }

    /// Spawns one worker per slice and waits for all of them.
    ///
    /// Finite workers stop after their pass; infinite workers stop only when
    /// `cancel` fires. A worker that panics is logged and left out of the
    /// summary.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        progress: ProgressBar,
    ) -> RunSummary {
        let ranges = partition(self.corpus.len(), self.config.thread_count, self.config.mode);
        info!(
            bodies = self.corpus.len(),
            workers = ranges.len(),
            mode = ?self.config.mode,
            "starting workers"
        );

        let begin = Instant::now();
        let mut set = JoinSet::new();
        for (rank, range) in ranges.into_iter().enumerate() {
            let worker = Worker::new(
                rank,
                self.config.clone(),
                self.corpus.clone(),
                range,
                self.client.clone(),
                progress.clone(),
            );
            let span = info_span!("worker", name = %worker.stats().name);
            let cancel = cancel.clone();
            set.spawn(
                async move { (rank, worker.run(cancel).await) }.instrument(span),
            );
        }

        let mut finished = Vec::with_capacity(self.config.thread_count);
        while let Some(res) = set.join_next().await {
            match res {
                Ok(done) => finished.push(done),
                Err(e) => warn!(error = %e, "worker died"),
            }
        }
        progress.finish();

        finished.sort_by_key(|(rank, _)| *rank);
        RunSummary {
            mode: self.config.mode,
            elapsed_secs: begin.elapsed().as_secs_f64(),
            workers: finished.into_iter().map(|(_, s)| s.snapshot()).collect(),
        }
    }
}
