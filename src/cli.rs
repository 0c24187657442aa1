//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::agent::langgraph::DEFAULT_LANGGRAPH_URL;
use crate::config::DEFAULT_LEDGER_PATH;
use crate::error::ConfigError;
use crate::pipeline::{DEFAULT_GRAPH_NAME, IngestionRequest};
use crate::schedule::DEFAULT_SCHEDULE;

#[derive(Debug, Parser)]
#[command(name = "mail-ingest")]
#[command(about = "Forward actionable Gmail messages to a LangGraph agent")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The subcommand, with a bare invocation meaning `run`.
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run one ingestion pass (default)
    Run,

    /// Run ingestion repeatedly on a local cron schedule
    Watch {
        /// Cron expression, 5 or 6 fields
        #[arg(long, default_value = DEFAULT_SCHEDULE)]
        schedule: String,
    },

    /// Register a recurring ingestion with the LangGraph deployment
    RegisterCron {
        /// Cron expression evaluated by the deployment
        #[arg(long, default_value = DEFAULT_SCHEDULE)]
        schedule: String,
    },

    /// Show recently dispatched messages
    History {
        /// Number of records to show
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Ingestion parameters shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Mailbox address to ingest for
    #[arg(long, env = "EMAIL_ADDRESS", global = true)]
    pub email: Option<String>,

    /// Only consider messages newer than this many minutes
    #[arg(long, default_value_t = 60, global = true)]
    pub minutes_since: u64,

    /// Include messages that have already been read
    #[arg(long, global = true)]
    pub include_read: bool,

    /// Dispatch the latest message of each thread without filtering
    #[arg(long, global = true)]
    pub skip_filters: bool,

    /// Dispatch messages again even if already processed
    #[arg(long, global = true)]
    pub rerun: bool,

    /// Stop after the first successful dispatch
    #[arg(long, global = true)]
    pub early: bool,

    /// Agent graph to run for each message
    #[arg(long, default_value = DEFAULT_GRAPH_NAME, global = true)]
    pub graph_name: String,

    /// LangGraph deployment URL
    #[arg(long, env = "LANGGRAPH_URL", default_value = DEFAULT_LANGGRAPH_URL, global = true)]
    pub url: String,

    /// Use fabricated mailbox data instead of Gmail
    #[arg(long, global = true)]
    pub mock: bool,

    /// Decide and report without dispatching or recording
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Ledger database path
    #[arg(long, env = "INGEST_LEDGER_PATH", default_value = DEFAULT_LEDGER_PATH, global = true)]
    pub ledger: PathBuf,
}

impl RunArgs {
    /// Address, or a configuration error naming how to supply it.
    pub fn address(&self) -> Result<&str, ConfigError> {
        self.email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "email".into(),
                hint: "Pass --email or set EMAIL_ADDRESS".into(),
            })
    }

    pub fn to_request(&self) -> Result<IngestionRequest, ConfigError> {
        Ok(
            IngestionRequest::with_minutes(self.address()?, self.minutes_since, &self.graph_name)?
                .include_read(self.include_read)
                .skip_filters(self.skip_filters)
                .rerun(self.rerun)
                .early_stop(self.early)
                .dry_run(self.dry_run),
        )
    }
}
