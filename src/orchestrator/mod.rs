//! The super agent: per-conversation state, intent routing and the
//! degradation policy for every sub-agent call it makes.

mod classifier;
mod extractor;
mod fallback;
mod state;
mod super_agent;
mod types;

pub use classifier::{
    parse_classification, Classification, IntentClassifier, KeywordIntentClassifier,
    LlmIntentClassifier, Topic,
};
pub use extractor::{Entities, EntityExtractor, KeywordEntityExtractor};
pub use fallback::{
    degrade, degrade_with, strip_meta_commentary, successful_payload, DEFAULT_NEXT_ACTIONS,
    FALLBACK_GREETING, FOLLOW_UP_ACTIONS, OFF_TOPIC_REFUSAL,
};
pub use state::{ConversationContext, ConversationState, ConversationTable, SharedConversation};
pub use super_agent::{Orchestrator, OrchestratorBuilder, SuperAgent, SUPER_AGENT};
pub use types::{AgentActivity, ChatInput, ChatReply, Phase, Role, Turn};
