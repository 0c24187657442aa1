//! Mailbox access — search and thread retrieval.
//!
//! The ingestion pipeline only talks to the mailbox through the
//! [`SearchClient`] and [`ThreadFetcher`] traits:
//! - `GmailClient` implements both against the Gmail REST API
//! - `MockMailbox` serves fabricated threads for `--mock` runs and tests

pub mod gmail;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::error::MailboxError;

pub use gmail::GmailClient;
pub use mock::MockMailbox;
pub use types::{Message, MessageRef, SearchQuery, Thread};

/// Executes a provider search query.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Return every message matching `query`, in provider order.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MessageRef>, MailboxError>;
}

/// Loads complete threads.
#[async_trait]
pub trait ThreadFetcher: Send + Sync {
    /// Fetch the full thread, sorted oldest → newest.
    ///
    /// A thread deleted since the search was run yields
    /// `MailboxError::ThreadNotFound`.
    async fn fetch_thread(&self, thread_id: &str) -> Result<Thread, MailboxError>;
}
