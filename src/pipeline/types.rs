//! Shared types for the ingestion pipeline.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::ConfigError;
use crate::mailbox::Message;

/// Graph the agent deployment exposes for Gmail ingestion.
pub const DEFAULT_GRAPH_NAME: &str = "email_assistant_hitl_memory_gmail";

/// The address is embedded verbatim in the search grammar, so it may not
/// carry whitespace or parentheses.
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s()@]+@[^\s()@]+$").expect("static regex"));

// ── Request ─────────────────────────────────────────────────────────

/// Parameters for one ingestion run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionRequest {
    address: String,
    #[serde(skip)]
    window: Duration,
    graph_name: String,
    include_read: bool,
    skip_filters: bool,
    rerun: bool,
    early_stop: bool,
    dry_run: bool,
}

impl IngestionRequest {
    /// Validate and build a request with all flags off.
    pub fn new(
        address: impl Into<String>,
        window: Duration,
        graph_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "email".into(),
                hint: "Pass --email or set EMAIL_ADDRESS".into(),
            });
        }
        if !ADDRESS_RE.is_match(&address) {
            return Err(ConfigError::InvalidValue {
                key: "email".into(),
                message: format!("'{address}' is not a plain email address"),
            });
        }
        if window <= Duration::zero() {
            return Err(ConfigError::InvalidValue {
                key: "minutes_since".into(),
                message: "window must be positive".into(),
            });
        }
        if Utc::now().checked_sub_signed(window).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "minutes_since".into(),
                message: "window reaches past the earliest representable date".into(),
            });
        }
        let graph_name = graph_name.into();
        if graph_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "graph_name".into(),
                message: "graph name must not be empty".into(),
            });
        }

        Ok(Self {
            address,
            window,
            graph_name,
            include_read: false,
            skip_filters: false,
            rerun: false,
            early_stop: false,
            dry_run: false,
        })
    }

    /// Shorthand for a window given in minutes.
    pub fn with_minutes(
        address: impl Into<String>,
        minutes: u64,
        graph_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let minutes = i64::try_from(minutes).map_err(|_| ConfigError::InvalidValue {
            key: "minutes_since".into(),
            message: format!("{minutes} is out of range"),
        })?;
        let window = Duration::try_minutes(minutes).ok_or_else(|| ConfigError::InvalidValue {
            key: "minutes_since".into(),
            message: format!("{minutes} is out of range"),
        })?;
        Self::new(address, window, graph_name)
    }

    pub fn include_read(mut self, yes: bool) -> Self {
        self.include_read = yes;
        self
    }

    pub fn skip_filters(mut self, yes: bool) -> Self {
        self.skip_filters = yes;
        self
    }

    pub fn rerun(mut self, yes: bool) -> Self {
        self.rerun = yes;
        self
    }

    pub fn early_stop(mut self, yes: bool) -> Self {
        self.early_stop = yes;
        self
    }

    pub fn dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn is_include_read(&self) -> bool {
        self.include_read
    }

    pub fn is_skip_filters(&self) -> bool {
        self.skip_filters
    }

    pub fn is_rerun(&self) -> bool {
        self.rerun
    }

    pub fn is_early_stop(&self) -> bool {
        self.early_stop
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// Why a thread produced nothing to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The target was written by the mailbox owner.
    SentByUser,
    /// Someone replied after the target.
    NotLatest,
    /// The thread came back with no messages.
    EmptyThread,
    /// The searched message is no longer in its thread.
    TargetMissing,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentByUser => "sent_by_user",
            Self::NotLatest => "not_latest",
            Self::EmptyThread => "empty_thread",
            Self::TargetMissing => "target_missing",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running the filter chain over one search hit.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Skip(SkipReason),
    Dispatch(Message),
}

// ── Report ──────────────────────────────────────────────────────────

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Search hits returned by the provider.
    pub found: usize,
    pub dispatched: usize,
    pub skipped_by_filter: usize,
    /// Ledger hits plus repeats within this run.
    pub already_processed: usize,
    pub retrieval_failures: usize,
    pub dispatch_failures: usize,
    /// Messages a dry run would have dispatched.
    pub dry_run_candidates: usize,
    pub stopped_early: bool,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found={} dispatched={} skipped={} already_processed={} retrieval_failures={} dispatch_failures={}",
            self.found,
            self.dispatched,
            self.skipped_by_filter,
            self.already_processed,
            self.retrieval_failures,
            self.dispatch_failures,
        )?;
        if self.dry_run_candidates > 0 {
            write!(f, " would_dispatch={}", self.dry_run_candidates)?;
        }
        if self.stopped_early {
            f.write_str(" (stopped early)")?;
        }
        Ok(())
    }
}

// ── Clock ───────────────────────────────────────────────────────────

/// Source of "now" for query windows and ledger timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
