pub mod agent;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod orchestrator;
pub mod runtime;
pub mod service;
pub mod state;
pub mod utils;

pub use agent::builtin::{register_builtin_agents, AgentInfo, BuiltinOptions, AVAILABLE_AGENTS};
pub use agent::{
    handler_fn, A2aMessage, Agent, AgentContext, AgentHandler, AgentIdentity, AgentProfile,
    AgentRegistry, MessageHandler, MessageKind, Payload, ProfileLoader, Reply,
};
pub use config::{LlmSettings, Settings};
pub use error::{Result, SalesFlowError};
pub use knowledge::{DynKnowledgeBase, KnowledgeBase, MemoryKnowledgeBase, Snippet};
pub use llm::{DynLlmClient, LlmClient, LlmRequest, LlmResponse};
#[cfg(feature = "openai-client")]
pub use llm::OpenAiClient;
pub use orchestrator::{
    ChatInput, ChatReply, EntityExtractor, IntentClassifier, Orchestrator, OrchestratorBuilder,
};
pub use runtime::{A2aRouter, Envelope, FanOutResult, HistoryFilter, RouterConfig};
pub use service::{ChatRequest, ChatService, ChatSession, ServiceStatus};
#[cfg(feature = "redis-store")]
pub use state::RedisConversationLog;
pub use state::{ConversationLog, ConversationSummary, LoggedMessage, MemoryConversationLog};
pub use utils::{logging, validation};
