use crate::error::{CallError, LoadError};
use crate::stats::ReportPolicy;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_THREAD_COUNT: usize = 32;
pub const DEFAULT_URL: &str = "http://localhost:19180/UpdateService/2.0";
pub const FINITE_SUCCESS_MARKER: &str = "<ns1:updateStatus>ok</ns1:updateStatus>";
pub const INFINITE_SUCCESS_MARKER: &str = "<updateStatus>ok</updateStatus>";

/// One pass per worker, or passes until cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Finite,
    Infinite,
}

impl Mode {
    pub fn default_timeout(self) -> Duration {
        match self {
            Mode::Finite => Duration::from_secs(60),
            Mode::Infinite => Duration::from_secs(120),
        }
    }

    pub fn default_success_marker(self) -> &'static str {
        match self {
            Mode::Finite => FINITE_SUCCESS_MARKER,
            Mode::Infinite => INFINITE_SUCCESS_MARKER,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub thread_count: usize,
    pub url: String,
    pub request_timeout: Duration,
    pub mode: Mode,
    pub success_marker: String,
    pub report_policy: ReportPolicy,
}

impl Config {
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            thread_count: DEFAULT_THREAD_COUNT,
            url: DEFAULT_URL.to_string(),
            request_timeout: mode.default_timeout(),
            mode,
            success_marker: mode.default_success_marker().to_string(),
            report_policy: ReportPolicy::for_mode(mode),
        }
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |message: String| Err(LoadError::InvalidConfig { message });

        if self.thread_count == 0 {
            return invalid("thread count must be at least 1".to_string());
        }
        if let Err(e) = reqwest::Url::parse(&self.url) {
            return invalid(format!("endpoint URL '{}': {e}", self.url));
        }
        if self.request_timeout.is_zero() {
            return invalid("request timeout must be positive".to_string());
        }
        if self.report_policy.is_degenerate() {
            return invalid(format!(
                "report policy {:?} never fires",
                self.report_policy
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_mode(Mode::Finite)
    }
}

/// Header and footer wrapped around every body fragment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestTemplate {
    pub header: String,
    pub footer: String,
}

impl RequestTemplate {
    pub fn new(header: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            footer: footer.into(),
        }
    }

    pub fn render(&self, body: &str) -> String {
        let mut payload =
            String::with_capacity(self.header.len() + body.len() + self.footer.len());
        payload.push_str(&self.header);
        payload.push_str(body);
        payload.push_str(&self.footer);
        payload
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CallOutcome {
    Ok,
    BadReply,
    Timeout,
    TransportError,
}

impl CallOutcome {
    /// Maps the result of one call onto exactly one outcome.
    pub fn classify(result: &Result<String, CallError>, success_marker: &str) -> Self {
        match result {
            Ok(body) if body.contains(success_marker) => CallOutcome::Ok,
            Ok(_) => CallOutcome::BadReply,
            Err(CallError::Timeout) => CallOutcome::Timeout,
            Err(CallError::Transport { .. }) => CallOutcome::TransportError,
        }
    }
}
