//! Downstream agent contract: process one message.
//!
//! The runner never talks to an agent deployment directly; it goes through
//! [`AgentIngest`]. `LangGraphClient` is the production implementation.

pub mod langgraph;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::mailbox::Message;

pub use langgraph::{CronKickoff, LangGraphClient, LangGraphConfig};

/// Email payload handed to the agent graph as `email_input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailInput {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub id: String,
}

impl EmailInput {
    /// Build the payload for a message. `from` is where replies should go.
    pub fn from_message(message: &Message) -> Self {
        Self {
            from: message.reply_address().to_string(),
            to: message.to.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            id: message.id.clone(),
        }
    }
}

/// What the agent reported back for one accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Agent-side conversation the message was routed into.
    pub agent_thread_id: Uuid,
    /// Run identifier, when the agent returned one.
    pub run_id: Option<String>,
    /// True when the agent-side thread had to be created.
    pub created_thread: bool,
}

/// Hands one message to the downstream agent graph.
#[async_trait]
pub trait AgentIngest: Send + Sync {
    async fn ingest(
        &self,
        message: &Message,
        graph_name: &str,
    ) -> Result<IngestReceipt, DispatchError>;
}
