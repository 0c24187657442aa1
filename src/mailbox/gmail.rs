//! Gmail REST client — search and thread retrieval over HTTPS.
//!
//! Uses two endpoints:
//! - `GET {base}/messages?q=…&pageToken=…` for the search (all pages)
//! - `GET {base}/threads/{id}?format=full` for complete threads
//!
//! Credentials are an already-issued OAuth access token; acquiring or
//! refreshing it is left to whatever provisions `GMAIL_TOKEN`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConfigError, MailboxError};
use crate::mailbox::{Message, MessageRef, SearchClient, SearchQuery, Thread, ThreadFetcher};

/// Default Gmail API base for the authenticated user.
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Default location of a stored OAuth token.
const DEFAULT_TOKEN_PATH: &str = ".secrets/token.json";

/// Gmail label carried by unread messages.
const UNREAD_LABEL: &str = "UNREAD";

// ── Configuration ───────────────────────────────────────────────────

/// Gmail client configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub access_token: SecretString,
    pub timeout: Duration,
}

impl GmailConfig {
    /// Build config from the environment.
    ///
    /// The token comes from `GMAIL_TOKEN` (a token JSON document or a bare
    /// access token) or, failing that, the file at `GMAIL_TOKEN_PATH`
    /// (default `.secrets/token.json`).
    pub fn from_env(timeout: Duration) -> Result<Self, ConfigError> {
        let raw = match std::env::var("GMAIL_TOKEN") {
            Ok(token) if !token.trim().is_empty() => token,
            _ => {
                let path = std::env::var("GMAIL_TOKEN_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_PATH));
                if !path.exists() {
                    return Err(ConfigError::MissingRequired {
                        key: "GMAIL_TOKEN".into(),
                        hint: format!(
                            "Set GMAIL_TOKEN or place a token file at {}",
                            path.display()
                        ),
                    });
                }
                std::fs::read_to_string(&path)?
            }
        };

        let api_base = std::env::var("GMAIL_API_BASE")
            .unwrap_or_else(|_| DEFAULT_GMAIL_API_BASE.to_string());

        Ok(Self {
            api_base,
            access_token: SecretString::from(parse_access_token(&raw)?),
            timeout,
        })
    }
}

/// Pull the access token out of a stored token document.
///
/// Accepts the `{"token": "...", "refresh_token": ...}` layout written by
/// Google's auth helpers, `{"access_token": "..."}`, or a bare token.
pub fn parse_access_token(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "GMAIL_TOKEN".into(),
                message: "token is empty".into(),
            });
        }
        return Ok(trimmed.to_string());
    }

    let doc: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| ConfigError::ParseError(format!("GMAIL_TOKEN is not valid JSON: {e}")))?;

    doc.get("token")
        .or_else(|| doc.get("access_token"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "GMAIL_TOKEN".into(),
            message: "no `token` or `access_token` field".into(),
        })
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<WireMessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessageRef {
    id: String,
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct WireThread {
    id: String,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: String,
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    internal_date: Option<String>,
    #[serde(default)]
    snippet: String,
    payload: Option<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<WireHeader>,
    body: Option<WireBody>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WireHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireBody {
    data: Option<String>,
}

impl WirePart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }
}

// ── Body extraction ─────────────────────────────────────────────────

fn decode_body(data: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Extract readable text from a MIME payload.
///
/// Order: a direct `text/plain` part, then a direct `text/html` part, then
/// nested parts depth-first, then the part's own body.
fn extract_text(part: &WirePart) -> Option<String> {
    if !part.parts.is_empty() {
        for mime in ["text/plain", "text/html"] {
            if let Some(text) = part
                .parts
                .iter()
                .filter(|p| p.mime_type == mime)
                .find_map(|p| p.data().and_then(decode_body))
            {
                return Some(text);
            }
        }
        if let Some(text) = part.parts.iter().find_map(extract_text) {
            return Some(text);
        }
    }
    part.data().and_then(decode_body)
}

fn into_message(wire: WireMessage) -> Message {
    let payload = wire.payload.unwrap_or_default();
    let header = |name: &str| payload.header(name).unwrap_or_default().to_string();

    let sent_at = wire
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let body = extract_text(&payload).unwrap_or_else(|| wire.snippet.clone());

    Message {
        id: wire.id,
        thread_id: wire.thread_id,
        from: header("From"),
        to: header("To"),
        subject: payload
            .header("Subject")
            .unwrap_or("(no subject)")
            .to_string(),
        reply_to: payload.header("Reply-To").map(str::to_string),
        sent_at,
        is_unread: wire.label_ids.iter().any(|l| l == UNREAD_LABEL),
        body,
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail API client implementing both mailbox traits.
pub struct GmailClient {
    config: GmailConfig,
    client: reqwest::Client,
}

impl GmailClient {
    pub fn new(config: GmailConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::ParseError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn auth_error(status: StatusCode) -> Option<MailboxError> {
        matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN).then(|| {
            MailboxError::AuthFailed {
                reason: format!("Gmail API returned {status}"),
            }
        })
    }
}

#[async_trait]
impl SearchClient for GmailClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MessageRef>, MailboxError> {
        info!(query = %query, "Searching Gmail");

        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query.as_str().to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let resp = self
                .client
                .get(self.url("messages"))
                .query(&params)
                .bearer_auth(self.config.access_token.expose_secret())
                .send()
                .await
                .map_err(|e| MailboxError::SearchFailed {
                    reason: e.to_string(),
                })?;

            let status = resp.status();
            if let Some(err) = Self::auth_error(status) {
                return Err(err);
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(MailboxError::SearchFailed {
                    reason: format!("Gmail API returned {status}: {body}"),
                });
            }

            let page: ListResponse = resp.json().await.map_err(|e| MailboxError::SearchFailed {
                reason: format!("invalid list response: {e}"),
            })?;

            debug!(count = page.messages.len(), "Fetched search page");
            refs.extend(
                page.messages
                    .into_iter()
                    .map(|m| MessageRef::new(m.id, m.thread_id)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(count = refs.len(), "Gmail search complete");
        Ok(refs)
    }
}

#[async_trait]
impl ThreadFetcher for GmailClient {
    async fn fetch_thread(&self, thread_id: &str) -> Result<Thread, MailboxError> {
        let resp = self
            .client
            .get(self.url(&format!("threads/{thread_id}")))
            .query(&[("format", "full")])
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| MailboxError::RetrievalFailed {
                thread_id: thread_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if let Some(err) = Self::auth_error(status) {
            return Err(err);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MailboxError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(MailboxError::RetrievalFailed {
                thread_id: thread_id.to_string(),
                reason: format!("Gmail API returned {status}"),
            });
        }

        let wire: WireThread = resp.json().await.map_err(|e| MailboxError::RetrievalFailed {
            thread_id: thread_id.to_string(),
            reason: format!("invalid thread response: {e}"),
        })?;

        let thread = Thread::new(
            wire.id,
            wire.messages.into_iter().map(into_message).collect(),
        );
        debug!(thread_id = %thread.thread_id, messages = thread.len(), "Fetched thread");
        Ok(thread)
    }
}
