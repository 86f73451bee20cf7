use std::time::Duration;

use crate::error::{Result, SalesFlowError};

/// Checks for settings and user input.
pub struct ConfigValidator;

fn config_error(message: impl Into<String>) -> SalesFlowError {
    SalesFlowError::Config(message.into())
}

impl ConfigValidator {
    /// Rejects empty keys and obvious placeholders.
    pub fn validate_api_key(api_key: &str) -> Result<()> {
        let key = api_key.trim();
        if key.is_empty() {
            return Err(config_error("LLM API key must not be empty"));
        }
        let placeholder = key.starts_with("your_")
            || key.starts_with('<')
            || (key.starts_with("sk-") && key.len() < 20);
        if placeholder {
            return Err(config_error("LLM API key looks like a placeholder"));
        }
        Ok(())
    }

    /// Only `http` and `https` URLs.
    pub fn validate_url(url: &str) -> Result<()> {
        match url.split_once("://") {
            Some(("http" | "https", rest)) if !rest.is_empty() => Ok(()),
            _ => Err(config_error(format!("`{url}` is not an http(s) URL"))),
        }
    }

    pub fn validate_model_name(model: &str) -> Result<()> {
        if model.trim().is_empty() {
            return Err(config_error("LLM model name must not be empty"));
        }
        if model.contains(char::is_whitespace) {
            tracing::warn!(model = %model, "model name contains whitespace");
        }
        Ok(())
    }

    /// Agent names end up in file paths: ASCII letters, digits and `_` only.
    pub fn validate_agent_name(name: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SalesFlowError::Validation(format!(
                "invalid agent name `{name}`: use letters, digits and underscores"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout(key: &str, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(config_error(format!("{key} must be greater than zero")));
        }
        Ok(())
    }

    pub fn validate_temperature(temperature: f64) -> Result<()> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(config_error(format!(
                "temperature {temperature} is outside 0.0..=2.0"
            )));
        }
        Ok(())
    }

    /// A chat message must contain something besides whitespace.
    pub fn validate_chat_message(message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(SalesFlowError::Validation("message must not be empty".into()));
        }
        Ok(())
    }
}
