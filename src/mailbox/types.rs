//! Mailbox snapshot types: search refs, messages and sorted threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider search query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchQuery(String);

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A search hit: which message matched and which thread it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub message_id: String,
    pub thread_id: String,
}

impl MessageRef {
    pub fn new(message_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// A single email as seen at fetch time.
///
/// Read-state and headers are a snapshot; they are not refreshed if the
/// mailbox changes while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    /// Raw `From` header (e.g. `Alice <alice@example.com>`).
    pub from: String,
    /// Raw `To` header.
    pub to: String,
    pub subject: String,
    /// Raw `Reply-To` header, if the sender set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub is_unread: bool,
    pub body: String,
}

impl Message {
    /// Address a reply should go to: `Reply-To` when present, else `From`.
    pub fn reply_address(&self) -> &str {
        match self.reply_to.as_deref().map(str::trim) {
            Some(reply_to) if !reply_to.is_empty() => reply_to,
            _ => self.from.trim(),
        }
    }
}

/// A fully hydrated thread, messages ordered oldest → newest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub thread_id: String,
    messages: Vec<Message>,
}

impl Thread {
    /// Build a thread, sorting by send time with message id as tie-break.
    pub fn new(thread_id: impl Into<String>, mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            thread_id: thread_id.into(),
            messages,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message, if the thread has any.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn find(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_message(id: &str, thread_id: &str, from: &str, sent_secs: i64) -> Message {
    Message {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        from: from.to_string(),
        to: "me@example.com".to_string(),
        subject: "Hello".to_string(),
        reply_to: None,
        sent_at: DateTime::from_timestamp(sent_secs, 0).unwrap(),
        is_unread: true,
        body: "Hi there".to_string(),
    }
}
