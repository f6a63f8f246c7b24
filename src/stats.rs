//! Per-worker rolling counters and the policy deciding when they are reported.

use crate::model::{CallOutcome, Mode};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// When a worker logs its summary line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportPolicy {
    /// Every `n`th call.
    Every(u64),
    /// With probability `1 / one_in` after each call.
    Sampled { one_in: u32 },
}

impl ReportPolicy {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Finite => ReportPolicy::Every(100),
            Mode::Infinite => ReportPolicy::Sampled { one_in: 20 },
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, ReportPolicy::Every(0) | ReportPolicy::Sampled { one_in: 0 })
    }

    pub fn should_report<R: Rng>(&self, total_calls: u64, rng: &mut R) -> bool {
        match *self {
            ReportPolicy::Every(0) | ReportPolicy::Sampled { one_in: 0 } => false,
            ReportPolicy::Every(n) => total_calls % n == 0,
            ReportPolicy::Sampled { one_in } => rng.random_ratio(1, one_in),
        }
    }
}

/// Mutable counters owned by exactly one worker.
#[derive(Clone, Debug, Default)]
pub struct WorkerStats {
    pub name: String,
    pub loop_count: u64,
    pub total_calls: u64,
    pub ok: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub execute_time: Duration,
    pub recent_execute_time: Duration,
    pub recent_calls: u64,
}

fn average_secs(time: Duration, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        time.as_secs_f64() / calls as f64
    }
}

impl WorkerStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Counts one finished call. Elapsed time is accumulated whatever the outcome.
    pub fn record(&mut self, outcome: CallOutcome, elapsed: Duration) {
        self.execute_time += elapsed;
        self.recent_execute_time += elapsed;
        self.recent_calls += 1;
        self.total_calls += 1;
        match outcome {
            CallOutcome::Ok => self.ok += 1,
            CallOutcome::BadReply => self.failed += 1,
            CallOutcome::Timeout => self.timeouts += 1,
            CallOutcome::TransportError => self.errors += 1,
        }
    }

    pub fn average_secs(&self) -> f64 {
        average_secs(self.execute_time, self.total_calls)
    }

    pub fn recent_average_secs(&self) -> f64 {
        average_secs(self.recent_execute_time, self.recent_calls)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            name: self.name.clone(),
            loop_count: self.loop_count,
            total_calls: self.total_calls,
            ok: self.ok,
            failed: self.failed,
            timeouts: self.timeouts,
            errors: self.errors,
            average_secs: self.average_secs(),
            recent_average_secs: self.recent_average_secs(),
        }
    }

    /// Snapshot for a periodic report; starts a new "recent" window.
    pub fn take_snapshot(&mut self) -> Snapshot {
        let snapshot = self.snapshot();
        self.recent_execute_time = Duration::ZERO;
        self.recent_calls = 0;
        snapshot
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub loop_count: u64,
    pub total_calls: u64,
    pub ok: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub average_secs: f64,
    pub recent_average_secs: f64,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WS call summary: {} total / {} ok / {} failed / {} timeout / {} errors - \
             Total average execute time: {:.2} - Recent average execute time: {:.2}",
            self.total_calls,
            self.ok,
            self.failed,
            self.timeouts,
            self.errors,
            self.average_secs,
            self.recent_average_secs,
        )
    }
}

/// Final per-worker snapshots of a run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub elapsed_secs: f64,
    pub workers: Vec<Snapshot>,
}

impl RunSummary {
    fn sum(&self, field: impl Fn(&Snapshot) -> u64) -> u64 {
        self.workers.iter().map(field).sum()
    }

    pub fn total_calls(&self) -> u64 {
        self.sum(|s| s.total_calls)
    }

    pub fn ok(&self) -> u64 {
        self.sum(|s| s.ok)
    }

    pub fn failed(&self) -> u64 {
        self.sum(|s| s.failed)
    }

    pub fn timeouts(&self) -> u64 {
        self.sum(|s| s.timeouts)
    }

    pub fn errors(&self) -> u64 {
        self.sum(|s| s.errors)
    }

    /// Calls per second over the whole run.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.total_calls() as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}
