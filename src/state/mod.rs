//! Persistent conversation log.

mod store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::orchestrator::Role;

#[cfg(feature = "redis-store")]
pub use store::redis::RedisConversationLog;
pub use store::MemoryConversationLog;

/// One logged conversation message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LoggedMessage {
    pub fn new(role: Role, content: impl Into<String>, metadata: Option<Value>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub started_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Append-only store of chat turns.
///
/// Writing to an unknown conversation creates it.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<()>;

    /// In append order; empty for an unknown conversation.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<LoggedMessage>>;

    /// In creation order.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;
}

pub type DynConversationLog = Arc<dyn ConversationLog>;
