mod env;
mod settings;

pub use env::EnvConfig;
pub use settings::{LlmSettings, Settings, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
