use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the transport hands the orchestrator for one user turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatInput {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
}

impl ChatInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            message: message.into(),
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Which agents, channels and tools contributed to a reply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentActivity {
    pub primary_agent: String,
    pub sub_agents_invoked: Vec<String>,
    pub communication_methods: Vec<String>,
    pub tools_used: Vec<String>,
}

/// The orchestrator's answer for one turn, relayed verbatim by transports.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub conversation_id: String,
    pub message: String,
    pub intent: String,
    pub state: Phase,
    pub next_actions: Vec<String>,
    pub agent_activity: AgentActivity,
}

/// Conversation lifecycle. Moves forward only.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Initial,
    Engaged,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initial => "initial",
            Phase::Engaged => "engaged",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
