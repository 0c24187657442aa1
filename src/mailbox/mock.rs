//! In-memory mailbox — fabricated threads for `--mock` runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::MailboxError;
use crate::mailbox::{Message, MessageRef, SearchClient, SearchQuery, Thread, ThreadFetcher};

/// Mailbox backed by a fixed set of threads.
///
/// `search` returns every stored message in insertion order, dropping read
/// messages when the query carries `is:unread` so `--include-read` behaves
/// as it would against a real provider. Threads can be marked missing to
/// simulate deletion between search and fetch.
#[derive(Default)]
pub struct MockMailbox {
    order: Vec<MessageRef>,
    messages: HashMap<String, Message>,
    threads: HashMap<String, Vec<String>>,
    missing_threads: Vec<String>,
    fail_search: bool,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MockMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demo data used by `--mock`: one actionable thread, one the user
    /// already answered, and one with a newer reply from someone else.
    pub fn sample(address: &str, now: DateTime<Utc>) -> Self {
        let at = |mins: i64| now - Duration::minutes(mins);
        let msg = |id: &str, thread: &str, from: &str, subject: &str, body: &str, sent| Message {
            id: id.to_string(),
            thread_id: thread.to_string(),
            from: from.to_string(),
            to: address.to_string(),
            subject: subject.to_string(),
            reply_to: None,
            sent_at: sent,
            is_unread: true,
            body: body.to_string(),
        };

        let mut user_reply = msg(
            "mock-msg-2b",
            "mock-thread-2",
            address,
            "Re: Quarterly planning",
            "Thanks, I'll take a look tomorrow.",
            at(5),
        );
        user_reply.is_unread = false;
        user_reply.to = "pm@example.com".to_string();

        Self::new()
            .with_thread(vec![msg(
                "mock-msg-1",
                "mock-thread-1",
                "Sender <sender@example.com>",
                "Sample Email Subject",
                "This is a sample email body for testing the email assistant.",
                at(10),
            )])
            .with_thread(vec![
                msg(
                    "mock-msg-2a",
                    "mock-thread-2",
                    "PM <pm@example.com>",
                    "Quarterly planning",
                    "Can you review the attached plan?",
                    at(30),
                ),
                user_reply,
            ])
            .with_thread(vec![
                msg(
                    "mock-msg-3a",
                    "mock-thread-3",
                    "Ops <ops@example.com>",
                    "Deploy window",
                    "Is Thursday still OK for the deploy?",
                    at(45),
                ),
                msg(
                    "mock-msg-3b",
                    "mock-thread-3",
                    "Lead <lead@example.com>",
                    "Re: Deploy window",
                    "Thursday works, let's confirm the time.",
                    at(20),
                ),
            ])
    }

    /// Add a thread; every message in it becomes a search hit.
    pub fn with_thread(mut self, messages: Vec<Message>) -> Self {
        for message in messages {
            self.order
                .push(MessageRef::new(message.id.clone(), message.thread_id.clone()));
            self.threads
                .entry(message.thread_id.clone())
                .or_default()
                .push(message.id.clone());
            self.messages.insert(message.id.clone(), message);
        }
        self
    }

    /// Keep the thread's search hits but fail fetches for it.
    pub fn with_missing_thread(mut self, thread_id: &str) -> Self {
        self.missing_threads.push(thread_id.to_string());
        self
    }

    pub fn with_failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Flip a message to read, as if the user opened it between runs.
    pub fn mark_read(&mut self, message_id: &str) {
        if let Some(message) = self.messages.get_mut(message_id) {
            message.is_unread = false;
        }
    }

    /// Queries seen by `search`, oldest first.
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchClient for MockMailbox {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MessageRef>, MailboxError> {
        if let Ok(mut seen) = self.queries.lock() {
            seen.push(query.clone());
        }
        if self.fail_search {
            return Err(MailboxError::SearchFailed {
                reason: "mock search failure".into(),
            });
        }

        let unread_only = query.as_str().split_whitespace().any(|t| t == "is:unread");
        Ok(self
            .order
            .iter()
            .filter(|r| {
                !unread_only
                    || self
                        .messages
                        .get(&r.message_id)
                        .is_some_and(|m| m.is_unread)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ThreadFetcher for MockMailbox {
    async fn fetch_thread(&self, thread_id: &str) -> Result<Thread, MailboxError> {
        if self.missing_threads.iter().any(|t| t == thread_id) {
            return Err(MailboxError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }
        let ids = self
            .threads
            .get(thread_id)
            .ok_or_else(|| MailboxError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            })?;
        let messages = ids
            .iter()
            .filter_map(|id| self.messages.get(id).cloned())
            .collect();
        Ok(Thread::new(thread_id, messages))
    }
}
