//! Progress persistence
//!
//! The chat-message store is an external collaborator. Messages appended
//! here are for UX streaming only; the core never reads them back.

use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Author of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    /// Intermediate orchestration output (sub-answers, plans)
    Agent,
    /// The final answer
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Agent => "agent",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Trait for appending progress messages to a run's conversation
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn append_message(&self, run_id: Uuid, role: MessageRole, content: &str) -> Result<()>;
}

/// Discards all messages
pub struct NoopMessageSink;

#[async_trait]
impl MessageSink for NoopMessageSink {
    async fn append_message(&self, _run_id: Uuid, _role: MessageRole, _content: &str) -> Result<()> {
        Ok(())
    }
}

/// Writes messages to the log
pub struct TracingMessageSink;

#[async_trait]
impl MessageSink for TracingMessageSink {
    async fn append_message(&self, run_id: Uuid, role: MessageRole, content: &str) -> Result<()> {
        tracing::debug!(
            run_id = %run_id,
            role = role.as_str(),
            chars = content.len(),
            "Appended run message"
        );
        Ok(())
    }
}
