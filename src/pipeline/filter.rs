//! Thread-position filter chain.
//!
//! Given a search hit and its freshly fetched thread, decides whether the
//! hit is actionable and which message to hand to the agent. Unread status
//! is not checked here: the query already applied it.

use tracing::debug;

use crate::mailbox::{MessageRef, Thread};
use crate::pipeline::types::{Decision, IngestionRequest, SkipReason};

/// Stateless decision logic over one thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterPipeline;

impl FilterPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Decide what to do with `msg_ref`.
    ///
    /// Without `skip_filters` the searched message is dispatched only when
    /// it is the newest in its thread and not written by the mailbox owner.
    /// With `skip_filters` the thread's newest message is dispatched as is.
    pub fn decide(
        &self,
        msg_ref: &MessageRef,
        thread: &Thread,
        request: &IngestionRequest,
    ) -> Decision {
        let Some(latest) = thread.latest() else {
            return Decision::Skip(SkipReason::EmptyThread);
        };

        if request.is_skip_filters() {
            return Decision::Dispatch(latest.clone());
        }

        let Some(target) = thread.find(&msg_ref.message_id) else {
            debug!(message_id = %msg_ref.message_id, "Searched message missing from thread");
            return Decision::Skip(SkipReason::TargetMissing);
        };

        if is_from_user(&target.from, request.address()) {
            return Decision::Skip(SkipReason::SentByUser);
        }
        if target.id != latest.id {
            return Decision::Skip(SkipReason::NotLatest);
        }
        Decision::Dispatch(target.clone())
    }
}

/// Case-insensitive substring test of the owner's address in a From header.
fn is_from_user(from: &str, address: &str) -> bool {
    from.to_lowercase().contains(&address.to_lowercase())
}
