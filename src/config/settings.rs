use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SalesFlowError};
use crate::runtime::{Retention, RouterConfig};
use crate::utils::ConfigValidator;

use super::env::EnvConfig;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug, PartialEq)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            temperature: 0.7,
        }
    }
}

/// Process-wide settings read from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub agent_timeout: Duration,
    pub sub_agent_timeout: Duration,
    /// Message history ring size; `0` keeps everything.
    pub history_limit: usize,
    pub profile_dir: Option<PathBuf>,
    pub knowledge_dir: Option<PathBuf>,
    pub mock_delay: Duration,
    pub llm: LlmSettings,
    pub redis_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(30),
            sub_agent_timeout: Duration::from_millis(5000),
            history_limit: 10_000,
            profile_dir: None,
            knowledge_dir: None,
            mock_delay: Duration::ZERO,
            llm: LlmSettings::default(),
            redis_url: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| EnvConfig::get_env_optional(key))
    }

    /// Builds settings from an arbitrary key lookup, so callers (and tests)
    /// need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let api_key = lookup("LLM_API_KEY")
            .or_else(|| lookup("OPENAI_API_KEY"))
            .and_then(|raw| EnvConfig::expand_reference(raw, &lookup));

        let settings = Self {
            agent_timeout: Duration::from_secs(parse(
                &lookup,
                "SALESFLOW_AGENT_TIMEOUT_SECS",
                defaults.agent_timeout.as_secs(),
            )?),
            sub_agent_timeout: Duration::from_millis(parse(
                &lookup,
                "SALESFLOW_SUB_AGENT_TIMEOUT_MS",
                defaults.sub_agent_timeout.as_millis() as u64,
            )?),
            history_limit: parse(&lookup, "SALESFLOW_HISTORY_LIMIT", defaults.history_limit)?,
            profile_dir: lookup("SALESFLOW_PROFILE_DIR").map(PathBuf::from),
            knowledge_dir: lookup("SALESFLOW_KNOWLEDGE_DIR").map(PathBuf::from),
            mock_delay: Duration::from_millis(parse(&lookup, "SALESFLOW_MOCK_DELAY_MS", 0)?),
            llm: LlmSettings {
                api_key,
                model: lookup("LLM_MODEL").unwrap_or(defaults.llm.model),
                base_url: lookup("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
                temperature: parse(&lookup, "LLM_TEMPERATURE", defaults.llm.temperature)?,
            },
            redis_url: lookup("REDIS_URL"),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_timeout("SALESFLOW_AGENT_TIMEOUT_SECS", self.agent_timeout)?;
        ConfigValidator::validate_timeout("SALESFLOW_SUB_AGENT_TIMEOUT_MS", self.sub_agent_timeout)?;
        ConfigValidator::validate_temperature(f64::from(self.llm.temperature))?;
        ConfigValidator::validate_url(&self.llm.base_url)?;
        ConfigValidator::validate_model_name(&self.llm.model)?;
        if let Some(api_key) = &self.llm.api_key {
            ConfigValidator::validate_api_key(api_key)?;
        }
        Ok(())
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            default_timeout: self.agent_timeout,
            retention: Retention::from_limit(self.history_limit),
            ..RouterConfig::default()
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| SalesFlowError::Config(format!("{key}=`{raw}`: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.router_config().retention, Retention::Bounded(10_000));
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("SALESFLOW_SUB_AGENT_TIMEOUT_MS", "250"),
            ("SALESFLOW_HISTORY_LIMIT", "0"),
            ("LLM_TEMPERATURE", "0.3"),
            ("OPENAI_API_KEY", "sk-1234567890abcdef1234567890"),
        ]))
        .unwrap();
        assert_eq!(settings.sub_agent_timeout, Duration::from_millis(250));
        assert_eq!(settings.router_config().retention, Retention::Unbounded);
        assert_eq!(settings.llm.api_key.as_deref(), Some("sk-1234567890abcdef1234567890"));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = Settings::from_lookup(lookup(&[("SALESFLOW_AGENT_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, SalesFlowError::Config(_)));

        let err = Settings::from_lookup(lookup(&[("LLM_TEMPERATURE", "3.5")])).unwrap_err();
        assert!(matches!(err, SalesFlowError::Config(_)));

        let err = Settings::from_lookup(lookup(&[("SALESFLOW_AGENT_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, SalesFlowError::Config(_)));
    }
}
