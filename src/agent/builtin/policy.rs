use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::agent::manifest::{title_case, AgentIdentity};
use crate::agent::{decode_payload, encode_payload, Agent, AgentContext, Payload};
use crate::error::{Result, SalesFlowError};
use crate::knowledge::{format_context, DynKnowledgeBase};

use super::BuiltinOptions;

#[derive(Debug, Deserialize)]
struct PolicyQuestion {
    #[serde(default)]
    question: String,
    #[serde(default = "default_n_results")]
    n_results: usize,
}

fn default_n_results() -> usize {
    3
}

#[derive(Debug, serde::Serialize)]
struct PolicyAnswer<'a> {
    question: &'a str,
    context: String,
    agent: &'a str,
    source: &'a str,
}

/// Answers policy questions from one knowledge collection.
pub struct PolicyAgent {
    identity: AgentIdentity,
    collection: String,
    summary: &'static str,
    knowledge: DynKnowledgeBase,
}

impl PolicyAgent {
    pub fn new(
        name: &str,
        summary: &'static str,
        knowledge: DynKnowledgeBase,
        options: &BuiltinOptions,
    ) -> Self {
        let identity = options.identity(name);
        info!(agent_name = %name, collection = %name, "policy_agent_initialized");
        Self {
            identity,
            collection: name.to_string(),
            summary,
            knowledge,
        }
    }

    pub fn product(knowledge: DynKnowledgeBase, options: &BuiltinOptions) -> Self {
        Self::new(
            "product_policy_agent",
            "Business Internet, Voice and Managed services, pricing, discounts, SLAs and installation fees",
            knowledge,
            options,
        )
    }

    pub fn order(knowledge: DynKnowledgeBase, options: &BuiltinOptions) -> Self {
        Self::new(
            "order_policy_agent",
            "Order requirements, validation, modification, cancellation and escalation",
            knowledge,
            options,
        )
    }

    pub fn service(knowledge: DynKnowledgeBase, options: &BuiltinOptions) -> Self {
        Self::new(
            "service_policy_agent",
            "Network coverage, serviceability criteria, uptime and response-time SLAs",
            knowledge,
            options,
        )
    }

    pub fn fulfillment(knowledge: DynKnowledgeBase, options: &BuiltinOptions) -> Self {
        Self::new(
            "fulfillment_policy_agent",
            "Equipment catalogue, installation scheduling and procedures, returns",
            knowledge,
            options,
        )
    }

    pub fn all(knowledge: DynKnowledgeBase, options: &BuiltinOptions) -> Vec<Self> {
        vec![
            Self::product(knowledge.clone(), options),
            Self::order(knowledge.clone(), options),
            Self::service(knowledge.clone(), options),
            Self::fulfillment(knowledge, options),
        ]
    }

    pub fn summary(&self) -> &str {
        self.summary
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    fn no_results(&self, question: &str) -> String {
        format!(
            "# No Policy Information Found\n\n\
             The question \"{question}\" did not match any information in the {} knowledge base.\n\n\
             ## Suggestions:\n\
             - Try rephrasing the question\n\
             - Check if this falls under a different policy area\n\
             - Contact the policy team for clarification\n",
            title_case(self.name())
        )
    }
}

#[async_trait]
impl Agent for PolicyAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "Knowledge Lookup"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: PolicyQuestion = decode_payload(&input)?;
        let question = request.question.trim();
        if question.is_empty() {
            return Err(SalesFlowError::Validation("No question provided".into()));
        }
        info!(agent = %self.name(), question, "policy_query");

        let snippets = self
            .knowledge
            .query(&self.collection, question, request.n_results.max(1))
            .await?;
        let context = if snippets.is_empty() {
            warn!(agent = %self.name(), question, "policy_query_no_results");
            self.no_results(question)
        } else {
            let context = format_context(&snippets);
            info!(agent = %self.name(), context_length = context.len(), "policy_query_success");
            context
        };

        encode_payload(&PolicyAnswer {
            question,
            context,
            agent: self.name(),
            source: &self.collection,
        })
    }
}
