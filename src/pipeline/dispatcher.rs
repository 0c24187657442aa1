//! Hands a chosen message to the agent and commits it to the ledger once
//! the agent accepted it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{AgentIngest, IngestReceipt};
use crate::error::{Error, Result};
use crate::mailbox::Message;
use crate::pipeline::types::Clock;
use crate::store::Ledger;

pub struct Dispatcher {
    agent: Arc<dyn AgentIngest>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(agent: Arc<dyn AgentIngest>, ledger: Arc<dyn Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            agent,
            ledger,
            clock,
        }
    }

    /// Dispatch one message and record it.
    ///
    /// A failed dispatch leaves the ledger untouched so the next run picks
    /// the message up again. A ledger failure after the agent accepted the
    /// message comes back as `Error::Database`.
    pub async fn dispatch(&self, message: &Message, graph_name: &str) -> Result<IngestReceipt> {
        let receipt = self.agent.ingest(message, graph_name).await?;

        let inserted = self
            .ledger
            .record(&message.id, &message.thread_id, self.clock.now())
            .await
            .map_err(Error::Database)?;

        if !inserted {
            debug!(message_id = %message.id, "Already recorded, keeping original record");
        }
        info!(
            message_id = %message.id,
            subject = %message.subject,
            agent_thread = %receipt.agent_thread_id,
            "Dispatched"
        );
        Ok(receipt)
    }
}
