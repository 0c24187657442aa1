//! LangGraph deployment client — pushes emails into an agent graph.
//!
//! One ingest maps a Gmail thread onto a LangGraph thread with a stable id,
//! clears out earlier runs on that thread, and starts a fresh run with
//! `multitask_strategy: rollback`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{AgentIngest, EmailInput, IngestReceipt};
use crate::error::{ConfigError, DispatchError};
use crate::mailbox::Message;

/// Default local `langgraph dev` server.
pub const DEFAULT_LANGGRAPH_URL: &str = "http://127.0.0.1:2024";

/// Graph that runs the ingest on the deployment side for registered crons.
const CRON_ASSISTANT_ID: &str = "cron";

/// Connection settings for a LangGraph deployment.
#[derive(Debug, Clone)]
pub struct LangGraphConfig {
    pub url: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl LangGraphConfig {
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_key,
            timeout,
        }
    }
}

/// Kickoff input stored with a deployment-side cron job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronKickoff {
    pub email: String,
    pub minutes_since: u64,
    pub graph_name: String,
    pub url: String,
    pub include_read: bool,
    pub rerun: bool,
    pub early: bool,
    pub skip_filters: bool,
}

impl CronKickoff {
    /// Scheduled runs always use the default filters and never rerun.
    pub fn new(
        email: impl Into<String>,
        minutes_since: u64,
        graph_name: impl Into<String>,
        url: impl Into<String>,
        include_read: bool,
    ) -> Self {
        Self {
            email: email.into(),
            minutes_since,
            graph_name: graph_name.into(),
            url: url.into(),
            include_read,
            rerun: false,
            early: false,
            skip_filters: false,
        }
    }
}

/// Stable LangGraph thread id for a Gmail thread: the md5 digest of the
/// Gmail id taken as the 16 UUID bytes.
pub fn langgraph_thread_id(gmail_thread_id: &str) -> Uuid {
    Uuid::from_bytes(md5::compute(gmail_thread_id.as_bytes()).0)
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct CronInfo {
    cron_id: Option<String>,
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for the LangGraph server API.
pub struct LangGraphClient {
    config: LangGraphConfig,
    client: reqwest::Client,
}

impl LangGraphClient {
    pub fn new(config: LangGraphConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::ParseError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{path}", self.config.url.trim_end_matches('/'));
        let builder = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => builder.header("x-api-key", key.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, DispatchError> {
        builder.send().await.map_err(|e| DispatchError::RequestFailed {
            reason: e.to_string(),
        })
    }

    /// Turn a non-success response into a dispatch error.
    async fn status_error(resp: Response) -> DispatchError {
        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return DispatchError::AuthFailed {
                status: status.as_u16(),
            };
        }
        DispatchError::Rejected {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        }
    }

    async fn expect_success(&self, builder: RequestBuilder) -> Result<Response, DispatchError> {
        let resp = self.send(builder).await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(Self::status_error(resp).await)
        }
    }

    /// Make sure the thread exists. Returns true if it had to be created.
    async fn ensure_thread(&self, thread_id: Uuid) -> Result<bool, DispatchError> {
        let resp = self
            .send(self.request(Method::GET, &format!("threads/{thread_id}")))
            .await?;

        if resp.status().is_success() {
            debug!(%thread_id, "Found existing agent thread");
            return Ok(false);
        }
        if resp.status() != StatusCode::NOT_FOUND {
            return Err(Self::status_error(resp).await);
        }

        info!(%thread_id, "Creating agent thread");
        self.expect_success(
            self.request(Method::POST, "threads")
                .json(&json!({ "thread_id": thread_id, "if_exists": "do_nothing" })),
        )
        .await?;
        Ok(true)
    }

    /// Delete every earlier run on the thread. Failures are logged only.
    async fn clear_runs(&self, thread_id: Uuid) {
        let runs: Vec<RunInfo> = match self
            .expect_success(self.request(Method::GET, &format!("threads/{thread_id}/runs")))
            .await
        {
            Ok(resp) => match resp.json().await {
                Ok(runs) => runs,
                Err(e) => {
                    warn!(%thread_id, error = %e, "Could not parse run list");
                    return;
                }
            },
            Err(e) => {
                warn!(%thread_id, error = %e, "Could not list previous runs");
                return;
            }
        };

        for run in runs {
            debug!(%thread_id, run_id = %run.run_id, "Deleting previous run");
            if let Err(e) = self
                .expect_success(self.request(
                    Method::DELETE,
                    &format!("threads/{thread_id}/runs/{}", run.run_id),
                ))
                .await
            {
                warn!(%thread_id, run_id = %run.run_id, error = %e, "Failed to delete run");
            }
        }
    }

    /// Register a recurring ingest with the deployment's cron scheduler.
    ///
    /// Returns the cron id when the server reports one.
    pub async fn register_cron(
        &self,
        schedule: &str,
        kickoff: &CronKickoff,
    ) -> Result<Option<String>, DispatchError> {
        let resp = self
            .expect_success(self.request(Method::POST, "runs/crons").json(&json!({
                "assistant_id": CRON_ASSISTANT_ID,
                "schedule": schedule,
                "input": kickoff,
            })))
            .await?;

        let cron: CronInfo = resp.json().await.unwrap_or(CronInfo { cron_id: None });
        info!(
            schedule,
            email = %kickoff.email,
            graph = %kickoff.graph_name,
            cron_id = cron.cron_id.as_deref().unwrap_or("-"),
            "Cron job registered"
        );
        Ok(cron.cron_id)
    }
}

#[async_trait]
impl AgentIngest for LangGraphClient {
    async fn ingest(
        &self,
        message: &Message,
        graph_name: &str,
    ) -> Result<IngestReceipt, DispatchError> {
        let thread_id = langgraph_thread_id(&message.thread_id);
        debug!(gmail_thread = %message.thread_id, %thread_id, "Mapped thread id");

        let created_thread = self.ensure_thread(thread_id).await?;
        if !created_thread {
            self.clear_runs(thread_id).await;
        }

        self.expect_success(
            self.request(Method::PATCH, &format!("threads/{thread_id}"))
                .json(&json!({ "metadata": { "email_id": message.id } })),
        )
        .await?;

        let resp = self
            .send(
                self.request(Method::POST, &format!("threads/{thread_id}/runs"))
                    .json(&json!({
                        "assistant_id": graph_name,
                        "input": { "email_input": EmailInput::from_message(message) },
                        "multitask_strategy": "rollback",
                    })),
            )
            .await?;

        let status = resp.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY) {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Misconfigured {
                reason: format!("run creation for graph '{graph_name}' returned {status}: {body}"),
            });
        }
        if !status.is_success() {
            return Err(Self::status_error(resp).await);
        }

        let run_id = resp.json::<RunInfo>().await.ok().map(|r| r.run_id);
        info!(
            message_id = %message.id,
            %thread_id,
            graph = graph_name,
            run_id = run_id.as_deref().unwrap_or("-"),
            "Run created"
        );

        Ok(IngestReceipt {
            agent_thread_id: thread_id,
            run_id,
            created_thread,
        })
    }
}
