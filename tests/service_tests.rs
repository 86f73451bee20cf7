use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use salesflow::orchestrator::{Phase, Role, FALLBACK_GREETING};
use salesflow::state::LoggedMessage;
use salesflow::{
    register_builtin_agents, A2aRouter, BuiltinOptions, ChatRequest, ChatService,
    ConversationLog, ConversationSummary, DynKnowledgeBase, MemoryConversationLog,
    MemoryKnowledgeBase, Orchestrator, SalesFlowError, Settings,
};

fn settings_from(pairs: &[(&str, &str)]) -> salesflow::Result<Settings> {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    Settings::from_lookup(|key| values.get(key).cloned())
}

fn offline_service() -> ChatService {
    ChatService::from_settings(&settings_from(&[]).unwrap()).unwrap()
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let service = offline_service();

    let err = service
        .handle(ChatRequest::new("   "))
        .await
        .expect_err("blank message");
    assert!(matches!(err, SalesFlowError::Validation(_)));
    assert!(service.log().list_conversations().await.unwrap().is_empty());
}

#[tokio::test]
async fn handled_turns_are_logged() {
    let service = offline_service();

    let reply = service
        .handle(ChatRequest::new("What is the pricing for Internet 100?"))
        .await
        .unwrap();
    assert_eq!(reply.intent, "agent_query");

    let messages = service.log().list_messages(&reply.conversation_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "What is the pricing for Internet 100?");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, reply.message);
    let metadata = messages[1].metadata.as_ref().unwrap();
    assert_eq!(metadata["intent"], "agent_query");

    let conversations = service.log().list_conversations().await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].message_count, 2);
}

#[tokio::test]
async fn session_keeps_its_conversation() {
    let service = offline_service();
    let mut session = service.session();
    assert!(session.conversation_id().is_none());

    let first = session.send("Hello").await.unwrap();
    let second = session.send("What is your uptime SLA?").await.unwrap();

    assert_eq!(first.conversation_id, second.conversation_id);
    assert_eq!(session.conversation_id(), Some(first.conversation_id.as_str()));
    assert_eq!(second.state, Phase::Engaged);
    let state = service
        .orchestrator()
        .get_conversation(&first.conversation_id)
        .await
        .unwrap();
    assert_eq!(state.turns.len(), 4);
}

#[tokio::test]
async fn status_lists_orchestrator_and_builtin_agents() {
    let service = offline_service();
    service.handle(ChatRequest::new("Hello")).await.unwrap();

    let status = service.status();
    assert_eq!(status.status, "healthy");
    assert_eq!(status.agents.len(), 15);
    assert_eq!(status.agents[0].name, "super_agent");
    assert_eq!(status.conversations, 1);
}

struct BrokenLog;

#[async_trait]
impl ConversationLog for BrokenLog {
    async fn append_message(
        &self,
        _conversation_id: &str,
        _role: Role,
        _content: &str,
        _metadata: Option<Value>,
    ) -> salesflow::Result<()> {
        Err(SalesFlowError::Persistence("database is read-only".into()))
    }

    async fn list_messages(&self, _conversation_id: &str) -> salesflow::Result<Vec<LoggedMessage>> {
        Ok(Vec::new())
    }

    async fn list_conversations(&self) -> salesflow::Result<Vec<ConversationSummary>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn log_failures_do_not_fail_the_turn() {
    let router = A2aRouter::default();
    let knowledge: DynKnowledgeBase = Arc::new(MemoryKnowledgeBase::with_builtin_policies());
    let agents = register_builtin_agents(&router, knowledge, &BuiltinOptions::default());
    let orchestrator = Orchestrator::builder(router).build();
    let service = ChatService::new(orchestrator, Arc::new(BrokenLog), agents);

    let reply = service.handle(ChatRequest::new("Hello")).await.unwrap();
    assert_eq!(reply.message, FALLBACK_GREETING);
}

#[tokio::test]
async fn settings_wire_knowledge_and_profiles_from_disk() {
    let knowledge_dir = tempfile::tempdir().unwrap();
    let product_dir = knowledge_dir.path().join("product_policy_agent");
    fs::create_dir(&product_dir).unwrap();
    fs::write(
        product_dir.join("promo.md"),
        "Spring promotion: Internet 100 is discounted to $59.99 for the first year.",
    )
    .unwrap();

    let profile_dir = tempfile::tempdir().unwrap();
    fs::write(
        profile_dir.path().join("super_agent_context.json"),
        r#"{
            "role": "Business Sales Concierge",
            "personality": { "tone": "warm", "style": "concise" },
            "connected_agents": [
                { "name": "offer_agent", "communication": "A2A request", "purpose": "quotes" }
            ]
        }"#,
    )
    .unwrap();

    let settings = settings_from(&[
        ("SALESFLOW_KNOWLEDGE_DIR", knowledge_dir.path().to_str().unwrap()),
        ("SALESFLOW_PROFILE_DIR", profile_dir.path().to_str().unwrap()),
        ("SALESFLOW_SUB_AGENT_TIMEOUT_MS", "2000"),
    ])
    .unwrap();
    let service = ChatService::from_settings(&settings).unwrap();

    let identity = service.orchestrator().identity();
    assert!(identity.system_prompt.contains("Business Sales Concierge"));
    assert_eq!(identity.connected_agents(), vec!["offer_agent".to_string()]);

    let reply = service
        .handle(ChatRequest::new("Is there a promotion on the Internet 100 price?"))
        .await
        .unwrap();
    assert!(reply.message.contains("Spring promotion"));
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let err = settings_from(&[("SALESFLOW_SUB_AGENT_TIMEOUT_MS", "0")]).expect_err("zero timeout");
    assert!(matches!(err, SalesFlowError::Config(_)));

    let err = settings_from(&[("LLM_TEMPERATURE", "3.5")]).expect_err("temperature out of range");
    assert!(matches!(err, SalesFlowError::Config(_)));
}

#[tokio::test]
async fn memory_log_is_usable_directly() {
    let log = MemoryConversationLog::new();
    log.append_message("c-1", Role::User, "hi", None).await.unwrap();
    assert_eq!(log.list_messages("c-1").await.unwrap().len(), 1);
}
