//! One end-to-end ingestion pass.
//!
//! search → fetch thread → filter → ledger check → dispatch → record,
//! strictly in provider order with no parallelism.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agent::AgentIngest;
use crate::error::{Error, Result};
use crate::mailbox::{SearchClient, ThreadFetcher};
use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::filter::FilterPipeline;
use crate::pipeline::query::build_query;
use crate::pipeline::types::{Clock, Decision, IngestionRequest, RunReport, SystemClock};
use crate::store::Ledger;

pub struct IngestionRunner {
    search: Arc<dyn SearchClient>,
    fetcher: Arc<dyn ThreadFetcher>,
    ledger: Arc<dyn Ledger>,
    agent: Arc<dyn AgentIngest>,
    clock: Arc<dyn Clock>,
    filter: FilterPipeline,
}

impl IngestionRunner {
    pub fn new(
        search: Arc<dyn SearchClient>,
        fetcher: Arc<dyn ThreadFetcher>,
        agent: Arc<dyn AgentIngest>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            search,
            fetcher,
            ledger,
            agent,
            clock: Arc::new(SystemClock),
            filter: FilterPipeline::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one ingestion pass.
    ///
    /// Per-thread retrieval failures and non-fatal dispatch failures are
    /// counted and skipped. Search failures, credential or configuration
    /// problems, and ledger failures abort the run.
    pub async fn run_once(&self, request: &IngestionRequest) -> Result<RunReport> {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.ledger),
            Arc::clone(&self.clock),
        );
        let query = build_query(request, self.clock.now());
        info!(
            query = %query,
            graph = request.graph_name(),
            dry_run = request.is_dry_run(),
            "Starting ingestion run"
        );

        let refs = self.search.search(&query).await?;
        let mut report = RunReport {
            found: refs.len(),
            ..Default::default()
        };
        if refs.is_empty() {
            info!("No emails found matching the criteria");
            return Ok(report);
        }
        info!(count = refs.len(), "Found emails");

        let mut seen: HashSet<String> = HashSet::new();

        for msg_ref in &refs {
            let thread = match self.fetcher.fetch_thread(&msg_ref.thread_id).await {
                Ok(thread) => thread,
                Err(e) if e.is_recoverable() => {
                    warn!(
                        message_id = %msg_ref.message_id,
                        thread_id = %msg_ref.thread_id,
                        error = %e,
                        "Skipping message, thread unavailable"
                    );
                    report.retrieval_failures += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let message = match self.filter.decide(msg_ref, &thread, request) {
                Decision::Skip(reason) => {
                    debug!(message_id = %msg_ref.message_id, %reason, "Filtered out");
                    report.skipped_by_filter += 1;
                    continue;
                }
                Decision::Dispatch(message) => message,
            };

            if seen.contains(&message.id) {
                debug!(message_id = %message.id, "Already handled in this run");
                report.already_processed += 1;
                continue;
            }
            seen.insert(message.id.clone());

            if !request.is_rerun() && self.ledger.is_processed(&message.id).await? {
                debug!(message_id = %message.id, "Already processed");
                report.already_processed += 1;
                continue;
            }

            if request.is_dry_run() {
                info!(
                    message_id = %message.id,
                    from = %message.from,
                    subject = %message.subject,
                    "Would dispatch (dry run)"
                );
                report.dry_run_candidates += 1;
                continue;
            }

            match dispatcher.dispatch(&message, request.graph_name()).await {
                Ok(_) => report.dispatched += 1,
                Err(Error::Dispatch(e)) if !e.is_fatal() => {
                    error!(message_id = %message.id, error = %e, "Dispatch failed");
                    report.dispatch_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }

            if request.is_early_stop() {
                info!("Early stop after first dispatch");
                report.stopped_early = true;
                break;
            }
        }

        info!(%report, "Ingestion run complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::agent::IngestReceipt;
    use crate::error::{DispatchError, MailboxError};
    use crate::mailbox::types::test_message;
    use crate::mailbox::{Message, MockMailbox};
    use crate::pipeline::types::FixedClock;
    use crate::store::LibSqlLedger;

    const ME: &str = "me@example.com";

    /// Agent stub that records every ingest and can be told to fail.
    #[derive(Default)]
    struct RecordingAgent {
        calls: Mutex<Vec<String>>,
        fail_ids: Vec<String>,
        auth_fail: bool,
    }

    impl RecordingAgent {
        fn failing_on(ids: &[&str]) -> Self {
            Self {
                fail_ids: ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn rejecting_credentials() -> Self {
            Self {
                auth_fail: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentIngest for RecordingAgent {
        async fn ingest(
            &self,
            message: &Message,
            _graph_name: &str,
        ) -> std::result::Result<IngestReceipt, DispatchError> {
            self.calls.lock().unwrap().push(message.id.clone());
            if self.auth_fail {
                return Err(DispatchError::AuthFailed { status: 401 });
            }
            if self.fail_ids.contains(&message.id) {
                return Err(DispatchError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(IngestReceipt {
                agent_thread_id: Uuid::nil(),
                run_id: Some(format!("run-{}", message.id)),
                created_thread: true,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn request() -> IngestionRequest {
        IngestionRequest::with_minutes(ME, 60, "graph").unwrap()
    }

    /// Three single-message threads from other people.
    fn three_actionable() -> MockMailbox {
        MockMailbox::new()
            .with_thread(vec![test_message("m1", "t1", "a@x.com", 1)])
            .with_thread(vec![test_message("m2", "t2", "b@x.com", 2)])
            .with_thread(vec![test_message("m3", "t3", "c@x.com", 3)])
    }

    async fn runner(
        mailbox: MockMailbox,
        agent: Arc<RecordingAgent>,
    ) -> (IngestionRunner, Arc<LibSqlLedger>) {
        let mailbox = Arc::new(mailbox);
        let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
        let runner = IngestionRunner::new(mailbox.clone(), mailbox, agent, ledger.clone())
            .with_clock(Arc::new(FixedClock(now())));
        (runner, ledger)
    }

    #[tokio::test]
    async fn dispatches_and_records_actionable_messages() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        let report = runner.run_once(&request()).await.unwrap();
        assert_eq!(report.found, 3);
        assert_eq!(report.dispatched, 3);
        assert_eq!(agent.calls(), vec!["m1", "m2", "m3"]);

        let record = ledger.get("m2").await.unwrap().unwrap();
        assert_eq!(record.thread_id, "t2");
        assert_eq!(record.dispatched_at, now());
    }

    #[tokio::test]
    async fn second_run_dispatches_nothing() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, _ledger) = runner(three_actionable(), agent.clone()).await;

        runner.run_once(&request()).await.unwrap();
        let report = runner.run_once(&request()).await.unwrap();
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.already_processed, 3);
        assert_eq!(agent.calls().len(), 3);
    }

    #[tokio::test]
    async fn rerun_dispatches_again_but_keeps_one_record() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        runner.run_once(&request()).await.unwrap();
        let report = runner.run_once(&request().rerun(true)).await.unwrap();
        assert_eq!(report.dispatched, 3);
        assert_eq!(agent.calls().len(), 6);
        assert_eq!(ledger.list_recent(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn early_stop_dispatches_exactly_one() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        let report = runner.run_once(&request().early_stop(true)).await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert!(report.stopped_early);
        assert!(ledger.is_processed("m1").await.unwrap());
        assert!(!ledger.is_processed("m2").await.unwrap());
        assert!(!ledger.is_processed("m3").await.unwrap());
    }

    #[tokio::test]
    async fn early_stop_waits_for_a_successful_dispatch() {
        let agent = Arc::new(RecordingAgent::failing_on(&["m1"]));
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        let report = runner.run_once(&request().early_stop(true)).await.unwrap();
        assert_eq!(report.dispatch_failures, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(agent.calls(), vec!["m1", "m2"]);
        assert!(ledger.is_processed("m2").await.unwrap());
    }

    #[tokio::test]
    async fn dispatch_failure_is_not_recorded_and_run_continues() {
        let agent = Arc::new(RecordingAgent::failing_on(&["m2"]));
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        let report = runner.run_once(&request()).await.unwrap();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.dispatch_failures, 1);
        assert!(!ledger.is_processed("m2").await.unwrap());
        assert!(ledger.is_processed("m3").await.unwrap());
    }

    #[tokio::test]
    async fn auth_failure_aborts_the_run() {
        let agent = Arc::new(RecordingAgent::rejecting_credentials());
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        let err = runner.run_once(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch(DispatchError::AuthFailed { .. })));
        assert!(err.needs_operator());
        assert_eq!(agent.calls().len(), 1);
        assert!(ledger.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_thread_skips_only_that_ref() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, _ledger) =
            runner(three_actionable().with_missing_thread("t2"), agent.clone()).await;

        let report = runner.run_once(&request()).await.unwrap();
        assert_eq!(report.retrieval_failures, 1);
        assert_eq!(agent.calls(), vec!["m1", "m3"]);
    }

    #[tokio::test]
    async fn search_failure_aborts() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, _ledger) = runner(three_actionable().with_failing_search(), agent.clone()).await;

        let err = runner.run_once(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Mailbox(MailboxError::SearchFailed { .. })));
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn dry_run_dispatches_and_records_nothing() {
        let agent = Arc::new(RecordingAgent::default());
        let (runner, ledger) = runner(three_actionable(), agent.clone()).await;

        let report = runner.run_once(&request().dry_run(true)).await.unwrap();
        assert_eq!(report.dry_run_candidates, 3);
        assert_eq!(report.dispatched, 0);
        assert!(agent.calls().is_empty());
        assert!(ledger.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_filters_dispatches_latest_once_per_run() {
        // Both hits resolve to m2 once filters are skipped.
        let mailbox = MockMailbox::new().with_thread(vec![
            test_message("m1", "t1", "a@x.com", 1),
            test_message("m2", "t1", "b@x.com", 2),
        ]);
        let agent = Arc::new(RecordingAgent::default());
        let (runner, _ledger) = runner(mailbox, agent.clone()).await;

        let report = runner
            .run_once(&request().skip_filters(true).rerun(true))
            .await
            .unwrap();
        assert_eq!(agent.calls(), vec!["m2"]);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.already_processed, 1);
    }

    #[tokio::test]
    async fn self_sent_and_superseded_messages_are_filtered() {
        let mailbox = MockMailbox::new()
            .with_thread(vec![test_message("mine", "t1", "Me <me@example.com>", 1)])
            .with_thread(vec![
                test_message("old", "t2", "a@x.com", 1),
                test_message("new", "t2", "b@x.com", 2),
            ]);
        let agent = Arc::new(RecordingAgent::default());
        let (runner, _ledger) = runner(mailbox, agent.clone()).await;

        let report = runner.run_once(&request()).await.unwrap();
        assert_eq!(report.skipped_by_filter, 2);
        assert_eq!(agent.calls(), vec!["new"]);
    }

    #[tokio::test]
    async fn query_carries_window_and_unread_bound() {
        let mailbox = Arc::new(MockMailbox::new());
        let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
        let runner = IngestionRunner::new(
            mailbox.clone(),
            mailbox.clone(),
            Arc::new(RecordingAgent::default()),
            ledger,
        )
        .with_clock(Arc::new(FixedClock(now())));

        let report = runner.run_once(&request()).await.unwrap();
        assert_eq!(report, RunReport::default());
        let queries = mailbox.queries();
        assert_eq!(
            queries[0].as_str(),
            "(to:me@example.com OR from:me@example.com) after:1699996400 is:unread"
        );
    }

    #[tokio::test]
    async fn read_messages_dropped_unless_include_read() {
        let mut mailbox = three_actionable();
        mailbox.mark_read("m1");
        let agent = Arc::new(RecordingAgent::default());
        let (runner, _ledger) = runner(mailbox, agent.clone()).await;

        runner.run_once(&request()).await.unwrap();
        assert_eq!(agent.calls(), vec!["m2", "m3"]);

        runner.run_once(&request().include_read(true)).await.unwrap();
        assert_eq!(agent.calls(), vec!["m2", "m3", "m1"]);
    }
}
