use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use mail_ingest::agent::{CronKickoff, LangGraphClient, LangGraphConfig};
use mail_ingest::cli::{Cli, Command, RunArgs};
use mail_ingest::config::IngestConfig;
use mail_ingest::mailbox::gmail::GmailConfig;
use mail_ingest::mailbox::{GmailClient, MockMailbox, SearchClient, ThreadFetcher};
use mail_ingest::pipeline::IngestionRunner;
use mail_ingest::schedule;
use mail_ingest::store::{Ledger, LibSqlLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = IngestConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    match cli.subcommand() {
        Command::Run => {
            let request = cli.run.to_request()?;
            let runner = build_runner(&cli.run, &config).await?;
            let report = runner.run_once(&request).await?;
            eprintln!("{report}");
        }
        Command::Watch { schedule: expr } => {
            let request = cli.run.to_request()?;
            let cron_schedule = schedule::parse_schedule(&expr)?;
            let runner = build_runner(&cli.run, &config).await?;
            eprintln!("👀 Watching {} on '{expr}'", request.address());
            let (runner, request) = (&runner, &request);
            schedule::watch(
                &cron_schedule,
                async {
                    let _ = tokio::signal::ctrl_c().await;
                },
                move || runner.run_once(request),
            )
            .await?;
        }
        Command::RegisterCron { schedule: expr } => {
            schedule::parse_schedule(&expr)?;
            let address = cli.run.address()?;
            let client = langgraph_client(&cli.run, &config)?;
            let kickoff = CronKickoff::new(
                address,
                cli.run.minutes_since,
                &cli.run.graph_name,
                &cli.run.url,
                cli.run.include_read,
            );
            let cron_id = client.register_cron(&expr, &kickoff).await?;
            eprintln!("Cron job created with schedule: {expr}");
            eprintln!("   Email: {address}");
            eprintln!("   Window: past {} minutes", cli.run.minutes_since);
            eprintln!("   Graph: {}", cli.run.graph_name);
            if let Some(id) = cron_id {
                eprintln!("   Cron id: {id}");
            }
        }
        Command::History { limit, json } => {
            let ledger = open_ledger(&cli.run.ledger).await?;
            let records = ledger.list_recent(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No messages dispatched yet.");
            } else {
                for r in &records {
                    println!("{}  {}  {}", r.dispatched_at.to_rfc3339(), r.message_id, r.thread_id);
                }
            }
        }
    }

    Ok(())
}

/// Stderr logging, plus a daily-rolling file when a log dir is configured.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-ingest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

async fn open_ledger(path: &Path) -> anyhow::Result<LibSqlLedger> {
    LibSqlLedger::new_local(path)
        .await
        .with_context(|| format!("Failed to open ledger at {}", path.display()))
}

fn langgraph_client(args: &RunArgs, config: &IngestConfig) -> anyhow::Result<LangGraphClient> {
    Ok(LangGraphClient::new(LangGraphConfig::new(
        &args.url,
        config.agent_api_key.clone(),
        config.http_timeout,
    ))?)
}

async fn build_runner(args: &RunArgs, config: &IngestConfig) -> anyhow::Result<IngestionRunner> {
    let (search, fetcher): (Arc<dyn SearchClient>, Arc<dyn ThreadFetcher>) = if args.mock {
        let mailbox = Arc::new(MockMailbox::sample(args.address()?, chrono::Utc::now()));
        (mailbox.clone(), mailbox)
    } else {
        let gmail = Arc::new(GmailClient::new(GmailConfig::from_env(config.http_timeout)?)?);
        (gmail.clone(), gmail)
    };

    let ledger = Arc::new(open_ledger(&args.ledger).await?);
    let agent = Arc::new(langgraph_client(args, config)?);
    Ok(IngestionRunner::new(search, fetcher, agent, ledger))
}
