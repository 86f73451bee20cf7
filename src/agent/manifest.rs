use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Result, SalesFlowError};
use crate::utils::ConfigValidator;

/// Declarative capability/behaviour profile of one agent, read from
/// `<agent>_context.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    pub role: String,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_knowledge: Option<DomainKnowledge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connected_agents: Vec<ConnectedAgent>,
    /// Tool kind (`mcp_tools`, `rest_apis`, ...) to the tools of that kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connected_tools: BTreeMap<String, Vec<ToolBinding>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_metrics: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Personality {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub style: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainKnowledge {
    pub industry: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub business_rules: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectedAgent {
    pub name: String,
    pub communication: String,
    pub purpose: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolBinding {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub usage: String,
    pub when_to_use: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationRule {
    pub condition: String,
    pub action: String,
}

impl AgentProfile {
    pub fn builder(role: impl Into<String>) -> AgentProfileBuilder {
        AgentProfileBuilder::new(role)
    }

    pub fn connected_agent_names(&self) -> Vec<&str> {
        self.connected_agents
            .iter()
            .map(|agent| agent.name.as_str())
            .collect()
    }

    /// Renders the profile as a markdown system prompt.
    pub fn system_prompt(&self) -> String {
        let mut parts = vec![
            format!("# Role\nYou are a {}.", self.role),
            String::new(),
            "# Personality".to_string(),
            format!("- Tone: {}", self.personality.tone),
            format!("- Style: {}", self.personality.style),
        ];

        if let Some(knowledge) = &self.domain_knowledge {
            parts.push(String::new());
            parts.push("# Domain Knowledge".to_string());
            parts.push(format!("Industry: {}", knowledge.industry));
            if !knowledge.expertise.is_empty() {
                parts.push(String::new());
                parts.push("Expertise:".to_string());
                parts.extend(knowledge.expertise.iter().map(|item| format!("- {item}")));
            }
            if !knowledge.business_rules.is_empty() {
                parts.push(String::new());
                parts.push("Business Rules:".to_string());
                parts.extend(knowledge.business_rules.iter().map(|rule| format!("- {rule}")));
            }
        }

        if !self.connected_agents.is_empty() {
            parts.push(String::new());
            parts.push("# Connected Agents".to_string());
            parts.push("You can communicate with the following agents:".to_string());
            for agent in &self.connected_agents {
                parts.push(format!(
                    "- **{}** ({}): {}",
                    agent.name, agent.communication, agent.purpose
                ));
            }
        }

        if !self.connected_tools.is_empty() {
            parts.push(String::new());
            parts.push("# Available Tools".to_string());
            for (kind, tools) in &self.connected_tools {
                parts.push(format!("\n## {}", title_case(kind)));
                for tool in tools {
                    parts.push(format!("\n### {}", tool.name));
                    if let Some(server) = &tool.server {
                        parts.push(format!("Server: {server}"));
                    }
                    if let Some(endpoint) = &tool.endpoint {
                        parts.push(format!("Endpoint: {endpoint}"));
                    }
                    parts.push(format!("Usage: {}", tool.usage));
                    parts.push(format!("When to use: {}", tool.when_to_use));
                }
            }
        }

        if !self.escalation_rules.is_empty() {
            parts.push(String::new());
            parts.push("# Escalation Rules".to_string());
            for rule in &self.escalation_rules {
                parts.push(format!("- **If** {}, **then** {}", rule.condition, rule.action));
            }
        }

        if !self.success_metrics.is_empty() {
            parts.push(String::new());
            parts.push("# Success Metrics".to_string());
            parts.push("Your performance is measured by:".to_string());
            parts.extend(self.success_metrics.iter().map(|metric| format!("- {metric}")));
        }

        parts.join("\n")
    }
}

pub struct AgentProfileBuilder {
    profile: AgentProfile,
}

impl AgentProfileBuilder {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            profile: AgentProfile {
                role: role.into(),
                personality: Personality::default(),
                domain_knowledge: None,
                connected_agents: Vec::new(),
                connected_tools: BTreeMap::new(),
                escalation_rules: Vec::new(),
                success_metrics: Vec::new(),
            },
        }
    }

    pub fn personality(mut self, tone: impl Into<String>, style: impl Into<String>) -> Self {
        self.profile.personality = Personality {
            tone: tone.into(),
            style: style.into(),
        };
        self
    }

    pub fn connected_agent(
        mut self,
        name: impl Into<String>,
        communication: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        self.profile.connected_agents.push(ConnectedAgent {
            name: name.into(),
            communication: communication.into(),
            purpose: purpose.into(),
        });
        self
    }

    pub fn tool(mut self, kind: impl Into<String>, tool: ToolBinding) -> Self {
        self.profile
            .connected_tools
            .entry(kind.into())
            .or_default()
            .push(tool);
        self
    }

    pub fn escalation(mut self, condition: impl Into<String>, action: impl Into<String>) -> Self {
        self.profile.escalation_rules.push(EscalationRule {
            condition: condition.into(),
            action: action.into(),
        });
        self
    }

    pub fn build(self) -> AgentProfile {
        self.profile
    }
}

/// Reads `<agent>_context.json` files from one directory and caches them.
pub struct ProfileLoader {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<AgentProfile>>>,
}

impl ProfileLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `Ok(None)` when the agent has no profile file; a file that exists but
    /// does not parse is a `Config` error.
    pub fn load(&self, agent_name: &str) -> Result<Option<Arc<AgentProfile>>> {
        if let Some(profile) = self.cache.read().get(agent_name) {
            return Ok(Some(Arc::clone(profile)));
        }

        ConfigValidator::validate_agent_name(agent_name)?;
        let path = self.dir.join(format!("{agent_name}_context.json"));
        if !path.exists() {
            warn!(agent_name, file = %path.display(), "context_file_not_found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|err| SalesFlowError::Config(format!("{}: {err}", path.display())))?;
        let profile: AgentProfile = serde_json::from_str(&content)
            .map_err(|err| SalesFlowError::Config(format!("{}: {err}", path.display())))?;
        let profile = Arc::new(profile);
        self.cache
            .write()
            .insert(agent_name.to_string(), Arc::clone(&profile));
        info!(agent_name, "context_loaded");
        Ok(Some(profile))
    }
}

/// Who an agent is: its name, optional profile and the system prompt derived
/// from them.
#[derive(Clone, Debug)]
pub struct AgentIdentity {
    pub name: String,
    pub profile: Option<Arc<AgentProfile>>,
    pub system_prompt: String,
}

impl AgentIdentity {
    pub fn default_for(name: &str) -> Self {
        Self {
            name: name.to_string(),
            profile: None,
            system_prompt: format!("You are a {}.", title_case(name)),
        }
    }

    /// Never fails: a missing or unreadable profile falls back to
    /// [`AgentIdentity::default_for`].
    pub fn resolve(loader: Option<&ProfileLoader>, name: &str) -> Self {
        let Some(loader) = loader else {
            return Self::default_for(name);
        };
        match loader.load(name) {
            Ok(Some(profile)) => Self {
                name: name.to_string(),
                system_prompt: profile.system_prompt(),
                profile: Some(profile),
            },
            Ok(None) => Self::default_for(name),
            Err(err) => {
                error!(agent_name = %name, error = %err, "context_load_failed");
                Self::default_for(name)
            }
        }
    }

    pub fn connected_agents(&self) -> Vec<String> {
        self.profile
            .as_ref()
            .map(|profile| {
                profile
                    .connected_agent_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `prospect_agent` -> `Prospect Agent`.
pub fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
