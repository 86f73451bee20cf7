use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::llm::{DynLlmClient, LlmRequest};

use super::types::Turn;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    OnTopic,
    OffTopic,
}

/// How the orchestrator should handle one user message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub topic: Topic,
    /// Agents whose data the answer needs, in the order named.
    pub agents: Vec<String>,
    /// A ready-made reply, when the classifier produced one.
    pub response: Option<String>,
}

impl Classification {
    pub fn off_topic() -> Self {
        Self {
            topic: Topic::OffTopic,
            agents: Vec::new(),
            response: None,
        }
    }

    pub fn on_topic(agents: Vec<String>) -> Self {
        Self {
            topic: Topic::OnTopic,
            agents,
            response: None,
        }
    }
}

/// Opaque intent classification capability.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, message: &str, history: &[Turn]) -> Result<Classification>;

    /// Shown in `tools_used`.
    fn label(&self) -> &str;
}

/// Asks a language model to answer in the TOPIC / AGENT_NEEDED / RESPONSE
/// line protocol and parses the answer leniently.
pub struct LlmIntentClassifier {
    client: DynLlmClient,
    system_prompt: String,
    temperature: f32,
    label: String,
}

impl LlmIntentClassifier {
    pub fn new(client: DynLlmClient, system_prompt: impl Into<String>) -> Self {
        let label = client.model().to_string();
        Self {
            client,
            system_prompt: system_prompt.into(),
            temperature: 0.7,
            label,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn prompt(&self, message: &str, history: &[Turn]) -> String {
        let recent = &history[history.len().saturating_sub(10)..];
        let history = if recent.is_empty() {
            "No previous context".to_string()
        } else {
            recent
                .iter()
                .map(|turn| format!("{}: {}", turn.role.as_str().to_uppercase(), turn.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "CONVERSATION HISTORY:\n{history}\n\n\
             CURRENT USER MESSAGE:\n{message}\n\n\
             INSTRUCTIONS:\n\
             1. First, determine if this is on-topic (about our services) or off-topic\n\
             2. If OFF-TOPIC: politely decline and redirect to our services\n\
             3. If ON-TOPIC: determine what the customer needs\n\
             4. If you need information, name the agent (or agents, comma separated) to query\n\
             5. Format your response in clean markdown\n\n\
             Respond in this format:\n\
             TOPIC: [on-topic/off-topic]\n\
             AGENT_NEEDED: [agent_name or none]\n\
             RESPONSE: [your response to the customer]\n"
        )
    }
}

/// Parses the line protocol. Text without a `TOPIC:` line is treated as an
/// on-topic direct response.
pub fn parse_classification(text: &str) -> Classification {
    let mut topic = Topic::OnTopic;
    let mut agents = Vec::new();
    let mut response = None;

    if !text.contains("TOPIC:") {
        return Classification {
            topic,
            agents,
            response: Some(text.trim().to_string()).filter(|r| !r.is_empty()),
        };
    }

    let lines: Vec<&str> = text.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        let line = line.trim_start();
        if let Some(value) = line.strip_prefix("TOPIC:") {
            if value.trim().to_lowercase().contains("off-topic") {
                topic = Topic::OffTopic;
            }
        } else if let Some(value) = line.strip_prefix("AGENT_NEEDED:") {
            agents = value
                .split(',')
                .map(|agent| agent.trim().trim_matches('`').to_lowercase())
                .filter(|agent| !agent.is_empty() && agent != "none")
                .collect();
        } else if let Some(value) = line.strip_prefix("RESPONSE:") {
            let mut body = vec![value.trim()];
            body.extend(lines[index + 1..].iter().copied());
            let joined = body.join("\n").trim().to_string();
            response = Some(joined).filter(|r| !r.is_empty());
            break;
        }
    }

    Classification {
        topic,
        agents,
        response,
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, message: &str, history: &[Turn]) -> Result<Classification> {
        let request = LlmRequest::new(self.prompt(message, history))
            .with_system(self.system_prompt.clone())
            .with_temperature(self.temperature);
        let reply = self.client.complete(request).await?;
        let classification = parse_classification(&reply.content);
        debug!(topic = ?classification.topic, agents = ?classification.agents, "intent_classified");
        Ok(classification)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

const OFF_TOPIC_WORDS: &[&str] = &[
    "weather", "sports", "football", "basketball", "movie", "movies", "recipe", "news",
    "election", "celebrity", "joke", "lottery",
];

const ROUTES: &[(&str, &[&str])] = &[
    (
        "product_policy_agent",
        &["price", "pricing", "cost", "plan", "plans", "product", "products", "speed", "mbps", "gig", "bundle"],
    ),
    (
        "order_policy_agent",
        &["cancel", "cancellation", "modify", "modification", "terms", "contract", "refund"],
    ),
    (
        "service_policy_agent",
        &["sla", "uptime", "support", "outage", "coverage", "availability", "available"],
    ),
    (
        "fulfillment_policy_agent",
        &["install", "installation", "equipment", "router", "technician", "schedule"],
    ),
];

/// Offline classifier matching keywords to policy agents.
#[derive(Clone, Debug, Default)]
pub struct KeywordIntentClassifier;

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, message: &str, _history: &[Turn]) -> Result<Classification> {
        let tokens: Vec<String> = message
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect();
        let mentions = |words: &[&str]| tokens.iter().any(|token| words.contains(&token.as_str()));

        let agents: Vec<String> = ROUTES
            .iter()
            .filter(|(_, words)| mentions(words))
            .map(|(agent, _)| agent.to_string())
            .collect();

        if agents.is_empty() && mentions(OFF_TOPIC_WORDS) {
            return Ok(Classification::off_topic());
        }
        Ok(Classification::on_topic(agents))
    }

    fn label(&self) -> &str {
        "Keyword Router"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_protocol() {
        let text = "TOPIC: on-topic\nAGENT_NEEDED: product_policy_agent, service_policy_agent\nRESPONSE: Let me check.\nMore detail.";
        let parsed = parse_classification(text);
        assert_eq!(parsed.topic, Topic::OnTopic);
        assert_eq!(parsed.agents, vec!["product_policy_agent", "service_policy_agent"]);
        assert_eq!(parsed.response.as_deref(), Some("Let me check.\nMore detail."));
    }

    #[test]
    fn off_topic_and_none_agent() {
        let parsed = parse_classification("TOPIC: off-topic\nAGENT_NEEDED: none\nRESPONSE:");
        assert_eq!(parsed.topic, Topic::OffTopic);
        assert!(parsed.agents.is_empty());
        assert!(parsed.response.is_none());
    }

    #[test]
    fn free_text_is_direct_response() {
        let parsed = parse_classification("Happy to help with your internet needs.");
        assert_eq!(parsed.topic, Topic::OnTopic);
        assert_eq!(parsed.response.as_deref(), Some("Happy to help with your internet needs."));
    }

    #[tokio::test]
    async fn keywords_route_to_policy_agents() {
        let classifier = KeywordIntentClassifier;
        let pricing = classifier.classify("What is the pricing for 500 Mbps?", &[]).await.unwrap();
        assert_eq!(pricing.agents, vec!["product_policy_agent"]);

        let both = classifier
            .classify("What does installation cost and what is the uptime SLA?", &[])
            .await
            .unwrap();
        assert_eq!(
            both.agents,
            vec!["product_policy_agent", "service_policy_agent", "fulfillment_policy_agent"]
        );

        let sports = classifier.classify("Who won the football game?", &[]).await.unwrap();
        assert_eq!(sports.topic, Topic::OffTopic);

        let hello = classifier.classify("Hello there", &[]).await.unwrap();
        assert_eq!(hello, Classification::on_topic(Vec::new()));
    }
}
