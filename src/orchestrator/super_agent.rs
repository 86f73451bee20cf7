use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::{
    decode_payload, encode_payload, title_case, A2aMessage, Agent, AgentContext, AgentIdentity,
    Payload, ProfileLoader,
};
use crate::error::Result;
use crate::llm::{DynLlmClient, LlmRequest};
use crate::payload;
use crate::runtime::{A2aRouter, Envelope};
use crate::utils::ids::generate_id;

use super::classifier::{
    Classification, IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier, Topic,
};
use super::extractor::{Entities, EntityExtractor, KeywordEntityExtractor};
use super::fallback::{
    degrade, strip_meta_commentary, successful_payload, DEFAULT_NEXT_ACTIONS, FALLBACK_GREETING,
    FOLLOW_UP_ACTIONS, OFF_TOPIC_REFUSAL,
};
use super::state::{ConversationContext, ConversationState, ConversationTable};
use super::types::{AgentActivity, ChatInput, ChatReply, Role};

pub const SUPER_AGENT: &str = "super_agent";
const PROSPECT_AGENT: &str = "prospect_agent";
const LEAD_AGENT: &str = "lead_generation_agent";

const DEFAULT_SUB_AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds an [`Orchestrator`] and registers its router-facing agent.
pub struct OrchestratorBuilder {
    router: A2aRouter,
    classifier: Option<Arc<dyn IntentClassifier>>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    generator: Option<DynLlmClient>,
    sub_agent_timeout: Duration,
    temperature: f32,
    profiles: Option<Arc<ProfileLoader>>,
}

impl OrchestratorBuilder {
    pub fn new(router: A2aRouter) -> Self {
        Self {
            router,
            classifier: None,
            extractor: None,
            generator: None,
            sub_agent_timeout: DEFAULT_SUB_AGENT_TIMEOUT,
            temperature: 0.7,
            profiles: None,
        }
    }

    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn generator(mut self, generator: DynLlmClient) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn maybe_generator(mut self, generator: Option<DynLlmClient>) -> Self {
        self.generator = generator;
        self
    }

    pub fn sub_agent_timeout(mut self, timeout: Duration) -> Self {
        self.sub_agent_timeout = timeout;
        self
    }

    /// Temperature of the default model-backed classifier.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn profiles(mut self, profiles: Option<Arc<ProfileLoader>>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn build(self) -> Arc<Orchestrator> {
        let identity = AgentIdentity::resolve(self.profiles.as_deref(), SUPER_AGENT);
        let classifier = match (self.classifier, &self.generator) {
            (Some(classifier), _) => classifier,
            (None, Some(generator)) => Arc::new(
                LlmIntentClassifier::new(Arc::clone(generator), classifier_system_prompt(&identity))
                    .with_temperature(self.temperature),
            ),
            (None, None) => Arc::new(KeywordIntentClassifier),
        };
        let orchestrator = Arc::new(Orchestrator {
            router: self.router.clone(),
            classifier,
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(KeywordEntityExtractor)),
            generator: self.generator,
            identity,
            sub_agent_timeout: self.sub_agent_timeout,
            conversations: ConversationTable::new(),
        });
        self.router.register_agent(Arc::new(SuperAgent {
            orchestrator: Arc::downgrade(&orchestrator),
        }));
        info!(agent = SUPER_AGENT, "orchestrator_ready");
        orchestrator
    }
}

fn classifier_system_prompt(identity: &AgentIdentity) -> String {
    let catalogue = crate::agent::builtin::AVAILABLE_AGENTS
        .iter()
        .map(|(name, description)| format!("- {name}: {description}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nYou can query these agents:\n{catalogue}\n\n\
         Only answer questions about business internet, voice and communication services.",
        identity.system_prompt
    )
}

/// Interprets user turns and coordinates the specialised agents.
pub struct Orchestrator {
    router: A2aRouter,
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn EntityExtractor>,
    generator: Option<DynLlmClient>,
    identity: AgentIdentity,
    sub_agent_timeout: Duration,
    conversations: ConversationTable,
}

/// Turn-local bookkeeping that ends up in the reply.
#[derive(Default)]
struct TurnActivity {
    sub_agents: Vec<String>,
    methods: Vec<String>,
    tools: Vec<String>,
}

impl TurnActivity {
    fn invoked(&mut self, agent: &str, method: &str) {
        if !self.sub_agents.iter().any(|known| known == agent) {
            self.sub_agents.push(agent.to_string());
        }
        if !self.methods.iter().any(|known| known == method) {
            self.methods.push(method.to_string());
        }
    }

    fn used(&mut self, tool: &str) {
        if !self.tools.iter().any(|known| known == tool) {
            self.tools.push(tool.to_string());
        }
    }
}

struct Answer {
    message: String,
    intent: &'static str,
    next_actions: &'static [&'static str],
}

impl Answer {
    fn new(message: impl Into<String>, intent: &'static str, next_actions: &'static [&'static str]) -> Self {
        Self {
            message: message.into(),
            intent,
            next_actions,
        }
    }

    fn fallback() -> Self {
        Self::new(FALLBACK_GREETING, "fallback", &DEFAULT_NEXT_ACTIONS)
    }
}

impl Orchestrator {
    pub fn builder(router: A2aRouter) -> OrchestratorBuilder {
        OrchestratorBuilder::new(router)
    }

    pub fn name(&self) -> &str {
        SUPER_AGENT
    }

    pub fn router(&self) -> &A2aRouter {
        &self.router
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Handles one user turn. Never fails: every internal failure degrades
    /// to a user-facing message.
    pub async fn process(&self, input: ChatInput) -> ChatReply {
        let conversation_id = input
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| generate_id("CONV"));
        let shared = self.conversations.get_or_create(&conversation_id);
        let mut state = shared.lock().await;
        info!(conversation_id = %conversation_id, phase = state.phase.as_str(), "turn_started");

        let mut activity = TurnActivity::default();

        let entities = degrade(
            "entity_extraction",
            self.extractor.extract(&input.message),
            Entities::default(),
        )
        .await;
        state.context.absorb(entities);
        self.fire_triggers(&conversation_id, &mut state.context, &mut activity);

        let answer = self.answer(&input.message, &state, &mut activity).await;

        state.record(Role::User, input.message);
        state.record(Role::Assistant, answer.message.clone());
        state.engage();
        info!(conversation_id = %conversation_id, intent = answer.intent, "turn_completed");

        ChatReply {
            conversation_id,
            message: answer.message,
            intent: answer.intent.to_string(),
            state: state.phase,
            next_actions: answer.next_actions.iter().map(|a| a.to_string()).collect(),
            agent_activity: AgentActivity {
                primary_agent: SUPER_AGENT.to_string(),
                sub_agents_invoked: activity.sub_agents,
                communication_methods: activity.methods,
                tools_used: activity.tools,
            },
        }
    }

    async fn answer(
        &self,
        message: &str,
        state: &ConversationState,
        activity: &mut TurnActivity,
    ) -> Answer {
        let classification = degrade(
            "intent_classification",
            async { self.classifier.classify(message, &state.turns).await.map(Some) },
            None,
        )
        .await;
        let Some(classification) = classification else {
            return Answer::fallback();
        };
        activity.used(self.classifier.label());
        debug!(topic = ?classification.topic, agents = ?classification.agents, "turn_classified");

        if classification.topic == Topic::OffTopic {
            return Answer::new(OFF_TOPIC_REFUSAL, "off_topic_refusal", &DEFAULT_NEXT_ACTIONS);
        }

        if !classification.agents.is_empty() {
            return self
                .answer_from_agents(message, &state.id, &state.context, classification, activity)
                .await;
        }

        if let Some(response) = classification.response {
            return Answer::new(response, "direct_response", &DEFAULT_NEXT_ACTIONS);
        }
        match self.generate_direct(message, state, activity).await {
            Some(text) => Answer::new(text, "direct_response", &DEFAULT_NEXT_ACTIONS),
            None => Answer::fallback(),
        }
    }

    async fn answer_from_agents(
        &self,
        message: &str,
        conversation_id: &str,
        context: &ConversationContext,
        classification: Classification,
        activity: &mut TurnActivity,
    ) -> Answer {
        let request = agent_request(message, context);
        let answers = self
            .query_agents(conversation_id, classification.agents, request, activity)
            .await;

        if answers.is_empty() {
            return match classification.response {
                Some(response) => Answer::new(response, "agent_query_degraded", &DEFAULT_NEXT_ACTIONS),
                None => Answer::fallback(),
            };
        }

        let mut sections = Vec::with_capacity(answers.len());
        for (agent, payload) in answers {
            let body = self.compose(message, &agent, &payload, activity).await;
            sections.push(format!("📋 **{}**\n\n{body}", title_case(&agent)));
        }
        let text = format!("{}\n\n**Need more details?** Just ask!", sections.join("\n\n"));
        Answer::new(text, "agent_query", &FOLLOW_UP_ACTIONS)
    }

    /// One target uses a plain blocking request, several fan out. Failed
    /// targets are dropped; the rest are kept in the order named.
    async fn query_agents(
        &self,
        conversation_id: &str,
        agents: Vec<String>,
        request: Payload,
        activity: &mut TurnActivity,
    ) -> Vec<(String, Payload)> {
        if let [agent] = agents.as_slice() {
            activity.invoked(agent, "A2A request");
            let reply = self
                .router
                .request(SUPER_AGENT, agent, request, Some(conversation_id), Some(self.sub_agent_timeout))
                .await;
            let payload = degrade(
                "agent_query",
                async { successful_payload(reply).map(Some) },
                None,
            )
            .await;
            return payload.map(|p| vec![(agent.clone(), p)]).unwrap_or_default();
        }

        for agent in &agents {
            activity.invoked(agent, "A2A fan-out");
        }
        let targets = agents
            .into_iter()
            .map(|agent| (agent, request.clone()))
            .collect();
        let results = self
            .router
            .request_all(SUPER_AGENT, targets, Some(conversation_id), self.sub_agent_timeout)
            .await;

        let mut answers = Vec::new();
        for result in results {
            let agent = result.agent;
            let outcome = successful_payload(result.outcome);
            if let Some(payload) = degrade("agent_query", async { outcome.map(Some) }, None).await {
                answers.push((agent, payload));
            }
        }
        answers
    }

    /// Turns one agent's data into user-facing text.
    async fn compose(
        &self,
        message: &str,
        agent: &str,
        payload: &Payload,
        activity: &mut TurnActivity,
    ) -> String {
        let raw = match payload.get("context").and_then(Value::as_str) {
            Some(context) => context.to_string(),
            None => serde_json::to_string_pretty(payload).unwrap_or_default(),
        };
        let Some(generator) = &self.generator else {
            return raw;
        };
        activity.used(generator.model());

        let prompt = format!(
            "The customer asked: {message}\n\n\
             Information from {}:\n{raw}\n\n\
             Answer the customer using only this information. Use clean markdown with short \
             sections, bullet points and tables where they help. Do not describe your formatting.",
            title_case(agent)
        );
        let request = LlmRequest::new(prompt)
            .with_system(self.identity.system_prompt.clone())
            .with_temperature(0.3);
        let formatted = degrade(
            "response_composition",
            async { generator.complete(request).await.map(|r| r.content) },
            raw.clone(),
        )
        .await;
        let stripped = strip_meta_commentary(&formatted);
        if stripped.is_empty() {
            raw
        } else {
            stripped
        }
    }

    async fn generate_direct(
        &self,
        message: &str,
        state: &ConversationState,
        activity: &mut TurnActivity,
    ) -> Option<String> {
        let generator = self.generator.as_ref()?;
        activity.used(generator.model());

        let recent = &state.turns[state.turns.len().saturating_sub(10)..];
        let mut prompt = String::new();
        for turn in recent {
            prompt.push_str(&format!("{}: {}\n", turn.role.as_str().to_uppercase(), turn.content));
        }
        prompt.push_str(&format!("USER: {message}"));

        let request = LlmRequest::new(prompt).with_system(self.identity.system_prompt.clone());
        let text = degrade(
            "direct_generation",
            async { generator.complete(request).await.map(|r| Some(r.content)) },
            None,
        )
        .await?;
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    /// Best-effort auxiliary calls. A trigger counts as made once the
    /// notification is accepted; its answer arrives through `on_message`.
    fn fire_triggers(
        &self,
        conversation_id: &str,
        context: &mut ConversationContext,
        activity: &mut TurnActivity,
    ) {
        if context.wants_prospect() {
            let request = payload!({
                "company_name": context.company_name,
                "contact_name": context.contact_name,
                "employee_count": context.employee_count,
            });
            let envelope =
                Envelope::request(SUPER_AGENT, PROSPECT_AGENT, request).conversation(conversation_id);
            match self.router.notify(envelope) {
                Ok(()) => {
                    context.prospect_requested = true;
                    activity.invoked(PROSPECT_AGENT, "A2A notify");
                    info!(conversation_id, company_name = ?context.company_name, "prospect_creation_requested");
                }
                Err(err) => warn!(conversation_id, error = %err, "prospect_creation_failed"),
            }
        }

        if context.wants_lead() {
            let request = payload!({
                "prospect_id": context.prospect_id,
                "company_name": context.company_name,
                "employee_count": context.employee_count,
            });
            let envelope =
                Envelope::request(SUPER_AGENT, LEAD_AGENT, request).conversation(conversation_id);
            match self.router.notify(envelope) {
                Ok(()) => {
                    context.lead_requested = true;
                    activity.invoked(LEAD_AGENT, "A2A notify");
                    info!(conversation_id, prospect_id = ?context.prospect_id, "lead_generation_requested");
                }
                Err(err) => warn!(conversation_id, error = %err, "lead_generation_failed"),
            }
        }
    }

    /// Folds an auxiliary agent's answer into its conversation.
    async fn absorb_reply(&self, message: A2aMessage) {
        let Some(conversation_id) = message.conversation_id() else {
            debug!(from_agent = %message.from_agent(), "reply without conversation ignored");
            return;
        };
        let Some(shared) = self.conversations.get(conversation_id) else {
            warn!(conversation_id, "reply for unknown conversation ignored");
            return;
        };
        if message.is_error() {
            warn!(
                conversation_id,
                from_agent = %message.from_agent(),
                error = message.error_text().unwrap_or_default(),
                "auxiliary_agent_failed"
            );
            return;
        }

        let payload = message.payload();
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        let mut state = shared.lock().await;
        match message.from_agent() {
            PROSPECT_AGENT => {
                state.context.prospect_id = text("prospect_id");
                state.context.qualification_status = text("qualification_status");
                info!(conversation_id, prospect_id = ?state.context.prospect_id, "prospect_created");
            }
            LEAD_AGENT => {
                state.context.lead_id = text("lead_id");
                state.context.lead_score = payload
                    .get("lead_score")
                    .and_then(Value::as_u64)
                    .and_then(|score| u8::try_from(score).ok());
                info!(conversation_id, lead_id = ?state.context.lead_id, lead_score = ?state.context.lead_score, "lead_created");
            }
            other => debug!(conversation_id, from_agent = other, "reply ignored"),
        }
    }

    /// Snapshot of one conversation.
    pub async fn get_conversation(&self, conversation_id: &str) -> Option<ConversationState> {
        let shared = self.conversations.get(conversation_id)?;
        let state = shared.lock().await;
        Some(state.clone())
    }

    /// Conversation ids in creation order.
    pub fn list_conversations(&self) -> Vec<String> {
        self.conversations.ids()
    }
}

/// What every queried agent receives: the question plus whatever the
/// conversation already knows.
fn agent_request(message: &str, context: &ConversationContext) -> Payload {
    let mut request = payload!({ "question": message, "message": message });
    if let Some(company) = &context.company_name {
        request.insert("company_name".into(), Value::String(company.clone()));
    }
    if let Some(count) = context.employee_count {
        request.insert("employee_count".into(), Value::from(count));
    }
    if let Some(prospect_id) = &context.prospect_id {
        request.insert("prospect_id".into(), Value::String(prospect_id.clone()));
    }
    request
}

/// Router-facing side of the orchestrator. Requests addressed to
/// `super_agent` are chat turns; unclaimed replies update conversations.
pub struct SuperAgent {
    orchestrator: Weak<Orchestrator>,
}

#[async_trait]
impl Agent for SuperAgent {
    fn name(&self) -> &str {
        SUPER_AGENT
    }

    fn framework(&self) -> &'static str {
        "Orchestrator"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let input: ChatInput = decode_payload(&input)?;
        let Some(orchestrator) = self.orchestrator.upgrade() else {
            return Err(anyhow::anyhow!("orchestrator has shut down").into());
        };
        let reply = orchestrator.process(input).await;
        encode_payload(&reply)
    }

    async fn on_message(&self, message: A2aMessage, _ctx: &AgentContext<'_>) -> Result<()> {
        if !message.kind().is_reply() {
            debug!(from_agent = %message.from_agent(), message_type = %message.kind(), "notification ignored");
            return Ok(());
        }
        if let Some(orchestrator) = self.orchestrator.upgrade() {
            orchestrator.absorb_reply(message).await;
        }
        Ok(())
    }
}
