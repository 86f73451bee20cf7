//! Text generation seam. The orchestrator classifies intents and polishes
//! agent answers through [`LlmClient`]; everything else in the crate runs
//! without one.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One completion: optional system prompt, one user prompt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmRequest {
    #[serde(default)]
    pub system: Option<String>,
    pub user: String,
    #[serde(default = "LlmRequest::default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl LlmRequest {
    fn default_temperature() -> f32 {
        0.7
    }

    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: Self::default_temperature(),
            metadata: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    /// Provider payload (usage, finish reason) when the client keeps it.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Failures surface as `Err`; callers decide how to degrade.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Shows up in `agent_activity.tools_used`.
    fn model(&self) -> &str {
        "local"
    }
}

pub type DynLlmClient = Arc<dyn LlmClient>;

#[cfg(feature = "openai-client")]
mod openai {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tracing::{debug, instrument};

    use super::{LlmClient, LlmRequest, LlmResponse};
    use crate::error::{Result, SalesFlowError};

    #[derive(Serialize)]
    struct WireMessage<'a> {
        role: &'static str,
        content: &'a str,
    }

    #[derive(Serialize)]
    struct CompletionBody<'a> {
        model: &'a str,
        messages: Vec<WireMessage<'a>>,
        temperature: f32,
    }

    #[derive(Deserialize)]
    struct CompletionReply {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ChoiceMessage,
    }

    #[derive(Deserialize)]
    struct ChoiceMessage {
        #[serde(default)]
        content: Option<String>,
    }

    fn body<'a>(model: &'a str, request: &'a LlmRequest) -> CompletionBody<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &request.user,
        });
        CompletionBody {
            model,
            messages,
            temperature: request.temperature,
        }
    }

    fn first_content(raw: &serde_json::Value) -> Result<String> {
        let reply: CompletionReply = serde_json::from_value(raw.clone())
            .map_err(|err| SalesFlowError::Generation(format!("malformed completion: {err}")))?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SalesFlowError::Generation("completion had no content".into()))
    }

    /// OpenAI-compatible `/chat/completions` client.
    pub struct OpenAiClient {
        http: reqwest::Client,
        endpoint: String,
        api_key: String,
        model: String,
    }

    impl OpenAiClient {
        pub fn new(
            base_url: impl Into<String>,
            api_key: impl Into<String>,
            model: impl Into<String>,
        ) -> Self {
            let base_url = base_url.into();
            Self {
                http: reqwest::Client::new(),
                endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
                api_key: api_key.into(),
                model: model.into(),
            }
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    #[async_trait]
    impl LlmClient for OpenAiClient {
        #[instrument(skip(self, request), fields(model = %self.model))]
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            let response = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body(&self.model, &request))
                .send()
                .await
                .map_err(|err| SalesFlowError::Generation(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SalesFlowError::Generation(format!(
                    "{} answered {status}",
                    self.endpoint
                )));
            }

            let raw: serde_json::Value = response
                .json()
                .await
                .map_err(|err| SalesFlowError::Generation(err.to_string()))?;
            let content = first_content(&raw)?;
            debug!(chars = content.len(), "completion_received");
            Ok(LlmResponse {
                content,
                metadata: raw.get("usage").cloned(),
            })
        }

        fn model(&self) -> &str {
            &self.model
        }
    }

    #[cfg(test)]
    mod tests {
        use serde_json::json;

        use super::*;

        #[test]
        fn body_puts_system_prompt_first() {
            let request = LlmRequest::new("Internet 500 price?")
                .with_system("You are a sales concierge.")
                .with_temperature(0.3);
            let wire = serde_json::to_value(body("gpt-4o-mini", &request)).unwrap();
            assert_eq!(wire["model"], "gpt-4o-mini");
            assert_eq!(wire["messages"][0]["role"], "system");
            assert_eq!(wire["messages"][1]["content"], "Internet 500 price?");
        }

        #[test]
        fn empty_choices_are_a_generation_error() {
            assert!(first_content(&json!({ "choices": [] })).is_err());
            let raw = json!({ "choices": [{ "message": { "content": "Hi!" } }] });
            assert_eq!(first_content(&raw).unwrap(), "Hi!");
        }

        #[test]
        fn endpoint_tolerates_trailing_slash() {
            let client = OpenAiClient::new("https://api.example.com/v1/", "key", "m");
            assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
        }
    }
}

#[cfg(feature = "openai-client")]
pub use openai::OpenAiClient;

/// `None` when no API key is configured or the `openai-client` feature is
/// off; the orchestrator then runs on keyword heuristics.
pub fn client_from_settings(settings: &crate::config::LlmSettings) -> Option<DynLlmClient> {
    #[cfg(feature = "openai-client")]
    {
        settings.api_key.as_ref().map(|api_key| {
            Arc::new(OpenAiClient::new(
                settings.base_url.clone(),
                api_key.clone(),
                settings.model.clone(),
            )) as DynLlmClient
        })
    }
    #[cfg(not(feature = "openai-client"))]
    {
        if settings.api_key.is_some() {
            tracing::warn!("LLM api key set but the `openai-client` feature is disabled");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmSettings;

    #[test]
    fn request_builder_sets_prompts() {
        let request = LlmRequest::new("hello")
            .with_system("be brief")
            .with_temperature(0.2);
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.temperature, 0.2);
    }

    #[test]
    fn no_key_means_offline() {
        let settings = LlmSettings::default();
        assert!(settings.api_key.is_none());
        assert!(client_from_settings(&settings).is_none());
    }
}
