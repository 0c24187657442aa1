//! `Ledger` trait for the durable record of dispatched messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;

/// One successfully dispatched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedRecord {
    pub message_id: String,
    pub thread_id: String,
    pub dispatched_at: DateTime<Utc>,
}

/// Dedup ledger keyed by message id.
///
/// Implementations must make `record` atomic per key: two runners recording
/// the same id concurrently leave exactly one row behind.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// True iff a record exists for `message_id`.
    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Record a dispatch. Returns `false` when the id was already present,
    /// in which case the existing record is left untouched.
    async fn record(
        &self,
        message_id: &str,
        thread_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Look up a single record.
    async fn get(&self, message_id: &str) -> Result<Option<ProcessedRecord>, DatabaseError>;

    /// Most recent records first, up to `limit`.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ProcessedRecord>, DatabaseError>;
}
