use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::orchestrator::Role;

use super::{ConversationLog, ConversationSummary, LoggedMessage};

/// In-process conversation log.
#[derive(Default)]
pub struct MemoryConversationLog {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    conversations: HashMap<String, MemoryConversation>,
    order: Vec<String>,
}

struct MemoryConversation {
    started_at: DateTime<Utc>,
    messages: Vec<LoggedMessage>,
}

impl MemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for MemoryConversationLog {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<()> {
        let message = LoggedMessage::new(role, content, metadata);
        let mut inner = self.inner.write();
        if !inner.conversations.contains_key(conversation_id) {
            inner.order.push(conversation_id.to_string());
        }
        inner
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| MemoryConversation {
                started_at: message.timestamp,
                messages: Vec::new(),
            })
            .messages
            .push(message);
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<LoggedMessage>> {
        Ok(self
            .inner
            .read()
            .conversations
            .get(conversation_id)
            .map(|conversation| conversation.messages.clone())
            .unwrap_or_default())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let inner = self.inner.read();
        Ok(inner
            .order
            .iter()
            .filter_map(|id| {
                inner.conversations.get(id).map(|conversation| ConversationSummary {
                    conversation_id: id.clone(),
                    started_at: conversation.started_at,
                    message_count: conversation.messages.len(),
                })
            })
            .collect())
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;
    use crate::error::SalesFlowError;
    use redis::AsyncCommands;

    const CONVERSATIONS_KEY: &str = "salesflow:conversations";

    fn persistence(err: redis::RedisError) -> SalesFlowError {
        SalesFlowError::Persistence(err.to_string())
    }

    fn conversation_key(conversation_id: &str) -> String {
        format!("salesflow:conversation:{conversation_id}")
    }

    fn messages_key(conversation_id: &str) -> String {
        format!("salesflow:messages:{conversation_id}")
    }

    /// Conversation log kept in redis: one hash per conversation, one message
    /// list per conversation and a list of conversation ids in creation order.
    pub struct RedisConversationLog {
        client: redis::Client,
    }

    impl RedisConversationLog {
        pub fn new(client: redis::Client) -> Self {
            Self { client }
        }

        pub fn open(url: &str) -> Result<Self> {
            let client = redis::Client::open(url).map_err(persistence)?;
            Ok(Self::new(client))
        }

        async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(persistence)
        }
    }

    #[async_trait]
    impl ConversationLog for RedisConversationLog {
        async fn append_message(
            &self,
            conversation_id: &str,
            role: Role,
            content: &str,
            metadata: Option<Value>,
        ) -> Result<()> {
            let message = LoggedMessage::new(role, content, metadata);
            let encoded = serde_json::to_string(&message)?;
            let mut conn = self.connection().await?;

            let created: bool = conn
                .hset_nx(
                    conversation_key(conversation_id),
                    "started_at",
                    message.timestamp.to_rfc3339(),
                )
                .await
                .map_err(persistence)?;
            if created {
                let _: i64 = conn
                    .rpush(CONVERSATIONS_KEY, conversation_id)
                    .await
                    .map_err(persistence)?;
            }
            let _: i64 = conn
                .rpush(messages_key(conversation_id), encoded)
                .await
                .map_err(persistence)?;
            Ok(())
        }

        async fn list_messages(&self, conversation_id: &str) -> Result<Vec<LoggedMessage>> {
            let mut conn = self.connection().await?;
            let raw: Vec<String> = conn
                .lrange(messages_key(conversation_id), 0, -1)
                .await
                .map_err(persistence)?;
            raw.iter()
                .map(|entry| serde_json::from_str(entry).map_err(SalesFlowError::from))
                .collect()
        }

        async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
            let mut conn = self.connection().await?;
            let ids: Vec<String> = conn
                .lrange(CONVERSATIONS_KEY, 0, -1)
                .await
                .map_err(persistence)?;

            let mut summaries = Vec::with_capacity(ids.len());
            for conversation_id in ids {
                let started_at: Option<String> = conn
                    .hget(conversation_key(&conversation_id), "started_at")
                    .await
                    .map_err(persistence)?;
                let message_count: usize = conn
                    .llen(messages_key(&conversation_id))
                    .await
                    .map_err(persistence)?;
                let started_at = started_at
                    .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
                    .map(|value| value.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                summaries.push(ConversationSummary {
                    conversation_id,
                    started_at,
                    message_count,
                });
            }
            Ok(summaries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_message_creates_conversation() {
        let log = MemoryConversationLog::new();
        assert!(log.list_conversations().await.unwrap().is_empty());

        log.append_message("c-2", Role::User, "hi", None).await.unwrap();
        log.append_message("c-1", Role::User, "hello", None).await.unwrap();
        log.append_message("c-2", Role::Assistant, "welcome", Some(serde_json::json!({"intent": "fallback"})))
            .await
            .unwrap();

        let conversations = log.list_conversations().await.unwrap();
        let ids: Vec<&str> = conversations.iter().map(|c| c.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["c-2", "c-1"]);
        assert_eq!(conversations[0].message_count, 2);

        let messages = log.list_messages("c-2").await.unwrap();
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].metadata.as_ref().unwrap()["intent"], "fallback");
        assert!(log.list_messages("missing").await.unwrap().is_empty());
    }
}
