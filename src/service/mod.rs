//! Transport-facing entry points. Every transport funnels into
//! [`Orchestrator::process`] and relays its reply unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::agent::builtin::{register_builtin_agents, AgentInfo, BuiltinOptions};
use crate::agent::ProfileLoader;
use crate::config::Settings;
use crate::error::Result;
use crate::knowledge::{DynKnowledgeBase, MemoryKnowledgeBase};
use crate::llm::client_from_settings;
use crate::orchestrator::{ChatInput, ChatReply, Orchestrator, Role, SUPER_AGENT};
use crate::runtime::A2aRouter;
use crate::state::{DynConversationLog, MemoryConversationLog};
use crate::utils::ConfigValidator;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub status: String,
    pub agents: Vec<AgentInfo>,
    pub conversations: usize,
}

#[derive(Clone)]
pub struct ChatService {
    orchestrator: Arc<Orchestrator>,
    log: DynConversationLog,
    agents: Arc<Vec<AgentInfo>>,
}

impl ChatService {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        log: DynConversationLog,
        agents: Vec<AgentInfo>,
    ) -> Self {
        Self {
            orchestrator,
            log,
            agents: Arc::new(agents),
        }
    }

    /// Wires router, built-in agents, orchestrator and conversation log
    /// from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let router = A2aRouter::new(settings.router_config());

        let knowledge = MemoryKnowledgeBase::with_builtin_policies();
        if let Some(dir) = &settings.knowledge_dir {
            let loaded = knowledge.load_dir(dir)?;
            info!(dir = %dir.display(), documents = loaded, "knowledge_loaded");
        }
        let knowledge: DynKnowledgeBase = Arc::new(knowledge);

        let profiles = settings
            .profile_dir
            .as_ref()
            .map(|dir| Arc::new(ProfileLoader::new(dir.clone())));
        let options = BuiltinOptions {
            mock_delay: settings.mock_delay,
            sub_agent_timeout: settings.sub_agent_timeout,
            profiles: profiles.clone(),
        };
        let mut agents = register_builtin_agents(&router, knowledge, &options);

        let orchestrator = Orchestrator::builder(router)
            .maybe_generator(client_from_settings(&settings.llm))
            .temperature(settings.llm.temperature)
            .sub_agent_timeout(settings.sub_agent_timeout)
            .profiles(profiles)
            .build();
        agents.insert(
            0,
            AgentInfo {
                name: SUPER_AGENT.to_string(),
                framework: "Orchestrator".to_string(),
            },
        );

        Ok(Self::new(orchestrator, conversation_log(settings)?, agents))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn log(&self) -> &DynConversationLog {
        &self.log
    }

    /// Request/response endpoint.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply> {
        ConfigValidator::validate_chat_message(&request.message)?;

        let input = ChatInput {
            conversation_id: request.conversation_id,
            message: request.message.clone(),
        };
        let reply = self.orchestrator.process(input).await;

        if let Err(err) = self
            .log
            .append_message(&reply.conversation_id, Role::User, &request.message, None)
            .await
        {
            warn!(conversation_id = %reply.conversation_id, error = %err, "conversation_log_failed");
        }
        let metadata = json!({
            "intent": reply.intent,
            "agent_activity": reply.agent_activity,
        });
        if let Err(err) = self
            .log
            .append_message(&reply.conversation_id, Role::Assistant, &reply.message, Some(metadata))
            .await
        {
            warn!(conversation_id = %reply.conversation_id, error = %err, "conversation_log_failed");
        }

        Ok(reply)
    }

    /// Duplex endpoint: a session that keeps its conversation between turns.
    pub fn session(&self) -> ChatSession {
        ChatSession {
            service: self.clone(),
            conversation_id: None,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            status: "healthy".to_string(),
            agents: self.agents.as_ref().clone(),
            conversations: self.orchestrator.list_conversations().len(),
        }
    }
}

#[cfg(feature = "redis-store")]
fn conversation_log(settings: &Settings) -> Result<DynConversationLog> {
    match &settings.redis_url {
        Some(url) => {
            info!("conversation log backed by redis");
            Ok(Arc::new(crate::state::RedisConversationLog::open(url)?))
        }
        None => Ok(Arc::new(MemoryConversationLog::new())),
    }
}

#[cfg(not(feature = "redis-store"))]
fn conversation_log(settings: &Settings) -> Result<DynConversationLog> {
    if settings.redis_url.is_some() {
        warn!("REDIS_URL set but the `redis-store` feature is disabled");
    }
    Ok(Arc::new(MemoryConversationLog::new()))
}

/// One live chat connection. Dropping it leaves the router untouched.
pub struct ChatSession {
    service: ChatService,
    conversation_id: Option<String>,
}

impl ChatSession {
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub async fn send(&mut self, message: impl Into<String>) -> Result<ChatReply> {
        let request = ChatRequest {
            message: message.into(),
            conversation_id: self.conversation_id.clone(),
        };
        let reply = self.service.handle(request).await?;
        self.conversation_id = Some(reply.conversation_id.clone());
        Ok(reply)
    }
}
