//! The demo agents behind the sales chatbot.
//!
//! Every agent here is deterministic: identical input yields identical
//! business fields, with only generated ids and timestamps varying.

mod order;
mod policy;
mod sales;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::knowledge::DynKnowledgeBase;
use crate::runtime::A2aRouter;

use super::agent::Agent;
use super::manifest::{AgentIdentity, ProfileLoader};

pub use order::{
    FulfillmentAgent, OrderAgent, PostActivationAgent, PostOrderCommunicationAgent,
    ServiceActivationAgent,
};
pub use policy::PolicyAgent;
pub use sales::{
    determine_priority, lead_grade, score_lead, AddressValidationAgent, CompanySize, Industry,
    LeadGenerationAgent, OfferAgent, ProspectAgent, ServiceabilityAgent, PRICE_BOOK,
    SERVICEABLE_ZIPS,
};

/// Shared knobs for the built-in agents.
#[derive(Clone)]
pub struct BuiltinOptions {
    /// Simulated processing time before each agent answers.
    pub mock_delay: Duration,
    /// Deadline for the blocking calls one agent makes to another.
    pub sub_agent_timeout: Duration,
    pub profiles: Option<Arc<ProfileLoader>>,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            mock_delay: Duration::ZERO,
            sub_agent_timeout: Duration::from_secs(5),
            profiles: None,
        }
    }
}

impl BuiltinOptions {
    pub(crate) fn identity(&self, name: &str) -> AgentIdentity {
        AgentIdentity::resolve(self.profiles.as_deref(), name)
    }

    pub(crate) async fn simulate_delay(&self) {
        if !self.mock_delay.is_zero() {
            tokio::time::sleep(self.mock_delay).await;
        }
    }
}

/// Name and framework label of one registered agent, for status output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: String,
    pub framework: String,
}

fn register<A>(router: &A2aRouter, agent: A, registered: &mut Vec<AgentInfo>)
where
    A: Agent + 'static,
{
    registered.push(AgentInfo {
        name: agent.name().to_string(),
        framework: agent.framework().to_string(),
    });
    router.register_agent(Arc::new(agent));
}

/// Registers the four policy agents and the ten operational agents.
pub fn register_builtin_agents(
    router: &A2aRouter,
    knowledge: DynKnowledgeBase,
    options: &BuiltinOptions,
) -> Vec<AgentInfo> {
    let mut registered = Vec::new();

    for agent in PolicyAgent::all(knowledge, options) {
        register(router, agent, &mut registered);
    }

    register(router, ProspectAgent::new(options), &mut registered);
    register(router, LeadGenerationAgent::new(options), &mut registered);
    register(router, ServiceabilityAgent::new(options), &mut registered);
    register(router, AddressValidationAgent::new(options), &mut registered);
    register(router, OfferAgent::new(options), &mut registered);
    register(router, OrderAgent::new(options), &mut registered);
    register(router, FulfillmentAgent::new(options), &mut registered);
    register(router, ServiceActivationAgent::new(options), &mut registered);
    register(router, PostActivationAgent::new(options), &mut registered);
    register(router, PostOrderCommunicationAgent::new(options), &mut registered);

    registered
}

/// Capability catalogue the orchestrator may route to, with a one-line
/// description each.
pub const AVAILABLE_AGENTS: [(&str, &str); 14] = [
    ("product_policy_agent", "Product information, pricing, features (knowledge lookup)"),
    ("order_policy_agent", "Order policies, discounts, terms (knowledge lookup)"),
    ("service_policy_agent", "Service level agreements, support (knowledge lookup)"),
    ("fulfillment_policy_agent", "Installation, equipment policies (knowledge lookup)"),
    ("prospect_agent", "Qualify business prospects"),
    ("lead_generation_agent", "Score and enrich leads"),
    ("serviceability_agent", "Check service availability"),
    ("address_validation_agent", "Validate addresses"),
    ("offer_agent", "Generate personalized quotes"),
    ("order_agent", "Process orders"),
    ("post_order_communication_agent", "Send confirmations"),
    ("fulfillment_agent", "Schedule installation"),
    ("service_activation_agent", "Activate services"),
    ("post_activation_agent", "Complete setup"),
];

pub(crate) fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// `1234.5` -> `$1,234.50`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (index, digit) in dollars.chars().enumerate() {
        if index > 0 && (dollars.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(79.99), "$79.99");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
    }
}
