//! Error types for mail-ingest.

/// Top-level error type for an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl Error {
    /// Whether retrying on the next scheduled tick cannot help.
    ///
    /// Credential and configuration problems need an operator; everything
    /// else (search outages, ledger hiccups) may clear up by itself.
    pub fn needs_operator(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Database(_) => false,
            Self::Mailbox(e) => matches!(e, MailboxError::AuthFailed { .. }),
            Self::Dispatch(e) => e.is_fatal(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ledger database errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mailbox search and thread retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Search failed: {reason}")]
    SearchFailed { reason: String },

    #[error("Thread {thread_id} not found")]
    ThreadNotFound { thread_id: String },

    #[error("Failed to retrieve thread {thread_id}: {reason}")]
    RetrievalFailed { thread_id: String, reason: String },

    #[error("Mailbox authentication failed: {reason}")]
    AuthFailed { reason: String },
}

impl MailboxError {
    /// Thread-level failures only cost the affected ref; anything else
    /// means the mailbox can't be trusted for the rest of the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ThreadNotFound { .. } | Self::RetrievalFailed { .. }
        )
    }
}

/// Downstream agent dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Agent request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Agent rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Agent authentication failed (status {status})")]
    AuthFailed { status: u16 },

    #[error("Agent misconfigured: {reason}")]
    Misconfigured { reason: String },
}

impl DispatchError {
    /// Auth and configuration problems abort the run; anything else only
    /// costs the message being dispatched.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed { .. } | Self::Misconfigured { .. })
    }
}

/// Result type alias for mail-ingest.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_errors_are_recoverable() {
        assert!(MailboxError::ThreadNotFound { thread_id: "t1".into() }.is_recoverable());
        assert!(
            MailboxError::RetrievalFailed {
                thread_id: "t1".into(),
                reason: "503".into()
            }
            .is_recoverable()
        );
        assert!(!MailboxError::AuthFailed { reason: "401".into() }.is_recoverable());
        assert!(!MailboxError::SearchFailed { reason: "boom".into() }.is_recoverable());
    }

    #[test]
    fn dispatch_fatality() {
        assert!(DispatchError::AuthFailed { status: 401 }.is_fatal());
        assert!(DispatchError::Misconfigured { reason: "no graph".into() }.is_fatal());
        assert!(!DispatchError::RequestFailed { reason: "timeout".into() }.is_fatal());
        assert!(
            !DispatchError::Rejected {
                status: 503,
                body: String::new()
            }
            .is_fatal()
        );
    }

    #[test]
    fn operator_needed_for_credentials() {
        let err: Error = MailboxError::AuthFailed { reason: "expired".into() }.into();
        assert!(err.needs_operator());
        let err: Error = MailboxError::SearchFailed { reason: "503".into() }.into();
        assert!(!err.needs_operator());
        let err: Error = DispatchError::AuthFailed { status: 403 }.into();
        assert!(err.needs_operator());
    }
}
