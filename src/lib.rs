//! Replays a corpus of SOAP request bodies against one endpoint from a fixed
//! pool of workers and reports per-worker latency and outcome counts.

pub mod corpus;
pub mod error;
pub mod model;
pub mod runner;
pub mod stats;
pub mod worker;

pub use corpus::{partition, Corpus};
pub use error::{CallError, LoadError};
pub use model::{CallOutcome, Config, Mode, RequestTemplate};
pub use runner::Runner;
pub use stats::{ReportPolicy, RunSummary, Snapshot, WorkerStats};
