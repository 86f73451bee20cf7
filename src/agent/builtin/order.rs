use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::agent::manifest::AgentIdentity;
use crate::agent::{decode_payload, encode_payload, A2aMessage, Agent, AgentContext, Payload};
use crate::error::Result;
use crate::utils::generate_id;

use super::sales::Address;
use super::BuiltinOptions;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrderRequest {
    prospect_id: Option<String>,
    products: Vec<String>,
    total_amount: f64,
    address: Option<Address>,
}

/// Outcome of one step in the order chain. A failed step never fails the
/// order; it becomes a note.
enum StepOutcome {
    Answered(Payload),
    Failed(String),
}

impl StepOutcome {
    fn from_reply(reply: Result<A2aMessage>) -> Self {
        match reply {
            Ok(message) if message.is_error() => StepOutcome::Failed(
                message
                    .error_text()
                    .unwrap_or("agent returned an error")
                    .to_string(),
            ),
            Ok(message) => StepOutcome::Answered(message.into_payload()),
            Err(err) => StepOutcome::Failed(err.to_string()),
        }
    }
}

/// Validates an order and chains serviceability and fulfillment.
pub struct OrderAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl OrderAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("order_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for OrderAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "ADK"
    }

    async fn process(&self, input: Payload, ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: OrderRequest = decode_payload(&input)?;
        info!(prospect_id = ?request.prospect_id, products = request.products.len(), "order_processing_started");
        self.options.simulate_delay().await;

        let order_id = generate_id("ORD");
        let timeout = self.options.sub_agent_timeout;
        let mut validation_passed = true;
        let mut notes: Vec<String> = Vec::new();
        let mut sub_agents_called: Vec<&str> = Vec::new();

        if request.prospect_id.is_none() {
            validation_passed = false;
            notes.push("Missing prospect ID".into());
        }
        if request.products.is_empty() {
            validation_passed = false;
            notes.push("No products selected".into());
        }

        let mut serviceability: Option<Payload> = None;
        let mut fulfillment: Option<Payload> = None;

        if let (true, Some(address)) = (validation_passed, request.address.as_ref()) {
            info!(order_id = %order_id, "order_agent_calling_serviceability");
            let reply = ctx
                .request(
                    self.name(),
                    "serviceability_agent",
                    crate::payload!({ "address": address, "requested_products": request.products }),
                    timeout,
                )
                .await;
            match StepOutcome::from_reply(reply) {
                StepOutcome::Failed(reason) => {
                    error!(order_id = %order_id, error = %reason, "serviceability_agent_call_failed");
                    notes.push(format!("Serviceability check failed: {reason}"));
                }
                StepOutcome::Answered(result) => {
                    sub_agents_called.push("serviceability_agent");
                    let serviceable = result
                        .get("serviceable")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    serviceability = Some(result);

                    if serviceable {
                        info!(order_id = %order_id, "order_agent_calling_fulfillment");
                        let reply = ctx
                            .request(
                                self.name(),
                                "fulfillment_agent",
                                crate::payload!({
                                    "order_id": order_id,
                                    "prospect_id": request.prospect_id,
                                    "products": request.products,
                                    "address": address,
                                }),
                                timeout,
                            )
                            .await;
                        match StepOutcome::from_reply(reply) {
                            StepOutcome::Answered(result) => {
                                sub_agents_called.push("fulfillment_agent");
                                fulfillment = Some(result);
                            }
                            StepOutcome::Failed(reason) => {
                                error!(order_id = %order_id, error = %reason, "fulfillment_agent_call_failed");
                                notes.push(format!("Fulfillment scheduling failed: {reason}"));
                            }
                        }
                    } else {
                        validation_passed = false;
                        notes.push("Address not serviceable".into());
                    }
                }
            }
        }

        let status = if validation_passed { "submitted" } else { "draft" };
        let next_steps = match (&fulfillment, validation_passed) {
            (Some(result), true) => {
                let date = result
                    .get("installation")
                    .and_then(|installation| installation.get("scheduled_date"))
                    .and_then(Value::as_str)
                    .unwrap_or("TBD");
                vec![
                    "Send order confirmation".to_string(),
                    format!("Installation scheduled: {date}"),
                    "Await installation".to_string(),
                ]
            }
            _ => vec![
                "Complete missing information".to_string(),
                "Resubmit order".to_string(),
            ],
        };

        info!(order_id = %order_id, status, validation_passed, ?sub_agents_called, "order_processed");
        encode_payload(&json!({
            "order_id": order_id,
            "prospect_id": request.prospect_id,
            "products": request.products,
            "total_amount": request.total_amount,
            "status": status,
            "validation_passed": validation_passed,
            "validation_notes": notes,
            "created_at": Utc::now().to_rfc3339(),
            "sub_agents_called": sub_agents_called,
            "serviceability_result": serviceability,
            "fulfillment_result": fulfillment,
            "next_steps": next_steps,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FulfillmentRequest {
    order_id: Option<String>,
    products: Vec<String>,
    address: Option<Address>,
}

fn equipment_for(products: &[String]) -> Vec<Value> {
    let mut equipment = Vec::new();
    for product in products {
        if product.contains("Internet") {
            equipment.push(json!({ "type": "ONT", "model": "FiberLink 2000", "quantity": 1 }));
            equipment.push(json!({ "type": "Router", "model": "NetGear BR500", "quantity": 1 }));
        }
        if product.contains("Voice") {
            equipment.push(json!({ "type": "VoIP Phone", "model": "Cisco SPA525", "quantity": 2 }));
        }
        if product.contains("WiFi") {
            equipment.push(json!({ "type": "WiFi AP", "model": "Ubiquiti UAP-AC-PRO", "quantity": 2 }));
        }
    }
    equipment
}

/// Assigns equipment and schedules installation ten days out.
pub struct FulfillmentAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl FulfillmentAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("fulfillment_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for FulfillmentAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "LangGraph (Async)"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: FulfillmentRequest = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let installation_date = Utc::now() + ChronoDuration::days(10);
        let fulfillment_id = generate_id("FUL");
        info!(fulfillment_id = %fulfillment_id, installation_date = %installation_date.date_naive(), "fulfillment_scheduled");
        encode_payload(&json!({
            "fulfillment_id": fulfillment_id,
            "order_id": request.order_id,
            "status": "scheduled",
            "equipment": equipment_for(&request.products),
            "installation": {
                "scheduled_date": installation_date.to_rfc3339(),
                "time_window": "8:00 AM - 12:00 PM",
                "technician_id": generate_id("TECH"),
                "estimated_duration": "2-4 hours",
            },
            "address": request.address,
            "next_steps": [
                "Equipment shipped to warehouse",
                "Technician assigned",
                "Customer notification sent"
            ],
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActivationRequest {
    order_id: Option<String>,
    products: Vec<String>,
}

/// Provisions every ordered product.
pub struct ServiceActivationAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl ServiceActivationAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("service_activation_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for ServiceActivationAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "LangGraph (Async)"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: ActivationRequest = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let activated_at = Utc::now().to_rfc3339();
        let services: Vec<Value> = request
            .products
            .iter()
            .map(|product| {
                let service_id = generate_id("SVC");
                let credentials = product.contains("Internet").then(|| {
                    json!({
                        "username": format!("user_{}", prefix(&service_id, 8)),
                        "temporary_password": "TempPass123!",
                    })
                });
                json!({
                    "service_id": service_id,
                    "product": product,
                    "status": "active",
                    "activated_at": activated_at,
                    "credentials": credentials,
                })
            })
            .collect();

        let activation_id = generate_id("ACT");
        info!(activation_id = %activation_id, num_services = services.len(), "services_activated");
        encode_payload(&json!({
            "activation_id": activation_id,
            "order_id": request.order_id,
            "status": "completed",
            "services": services,
            "network_info": {
                "static_ip": "203.0.113.42",
                "gateway": "203.0.113.1",
                "dns_servers": ["8.8.8.8", "8.8.4.4"],
            },
            "next_steps": [
                "Send welcome email with credentials",
                "Schedule follow-up call",
                "Update billing system"
            ],
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostActivationRequest {
    order_id: String,
    activation_id: Option<String>,
}

/// Billing, CRM and welcome-package completion after activation.
pub struct PostActivationAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl PostActivationAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("post_activation_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for PostActivationAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "LangGraph (Async)"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: PostActivationRequest = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let completion_id = generate_id("CMP");
        info!(completion_id = %completion_id, "post_activation_completed");
        encode_payload(&json!({
            "completion_id": completion_id,
            "order_id": request.order_id,
            "activation_id": request.activation_id,
            "status": "completed",
            "tasks_completed": [
                { "task": "billing_setup", "status": "completed", "details": "First invoice generated and sent" },
                { "task": "crm_update", "status": "completed", "details": "Customer record updated to active status" },
                { "task": "welcome_package", "status": "completed", "details": "Welcome email sent with account details" },
                { "task": "support_ticket_closed", "status": "completed", "details": "Installation ticket marked as resolved" },
            ],
            "customer_portal_access": {
                "url": "https://portal.example.com",
                "username": format!("customer_{}", prefix(&request.order_id, 8)),
                "setup_required": true,
            },
            "next_billing_date": (Utc::now() + ChronoDuration::days(30)).to_rfc3339(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CommunicationRequest {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default = "default_communication_type", rename = "type")]
    kind: String,
    #[serde(default = "default_customer_email")]
    customer_email: String,
    #[serde(default)]
    customer_phone: Option<String>,
}

fn default_communication_type() -> String {
    "order_confirmation".into()
}

fn default_customer_email() -> String {
    "customer@example.com".into()
}

/// Sends order confirmations and lifecycle updates.
pub struct PostOrderCommunicationAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl PostOrderCommunicationAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("post_order_communication_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for PostOrderCommunicationAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "Strands SDK"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: CommunicationRequest = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let order_id = request.order_id.unwrap_or_default();
        let (kind, subject, body, channels): (&str, String, String, &[&str]) =
            match request.kind.as_str() {
                "installation_scheduled" => (
                    "installation_scheduled",
                    format!("Installation Scheduled - {order_id}"),
                    "Your installation has been scheduled. A technician will arrive during your selected time window.".into(),
                    &["email", "sms"][..],
                ),
                "service_activated" => (
                    "service_activated",
                    format!("Service Activated - {order_id}"),
                    "Your service is now active! Welcome to our network.".into(),
                    &["email"][..],
                ),
                other => {
                    if other != "order_confirmation" {
                        warn!(communication_type = %other, "unknown communication type, sending confirmation");
                    }
                    (
                        "order_confirmation",
                        format!("Order Confirmation - {order_id}"),
                        format!("Thank you for your order! Your order {order_id} has been confirmed and is being processed."),
                        &["email", "sms"][..],
                    )
                }
            };

        let communication_id = generate_id("COMM");
        info!(communication_id = %communication_id, communication_type = kind, ?channels, "communication_sent");
        encode_payload(&json!({
            "communication_id": communication_id,
            "order_id": order_id,
            "type": kind,
            "channels": channels,
            "sent_to": {
                "email": request.customer_email,
                "phone": request.customer_phone,
            },
            "content": { "subject": subject, "body": body },
            "status": "sent",
            "sent_at": Utc::now().to_rfc3339(),
        }))
    }
}

fn prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::A2aRouter;

    #[tokio::test]
    async fn order_without_products_is_draft() {
        let router = A2aRouter::default();
        let agent = OrderAgent::new(&BuiltinOptions::default());
        let ctx = AgentContext::new(&router, None, "test");
        let result = agent
            .process(crate::payload!({ "prospect_id": "PROS-1" }), &ctx)
            .await
            .unwrap();
        assert_eq!(result["status"], "draft");
        assert_eq!(result["validation_notes"], json!(["No products selected"]));
        assert_eq!(result["sub_agents_called"], json!([]));
    }

    #[test]
    fn equipment_follows_products() {
        let equipment = equipment_for(&["Internet 500".into(), "Managed WiFi".into()]);
        assert_eq!(equipment.len(), 3);
        assert_eq!(equipment[2]["type"], "WiFi AP");
    }

    #[tokio::test]
    async fn communication_defaults_to_confirmation() {
        let router = A2aRouter::default();
        let agent = PostOrderCommunicationAgent::new(&BuiltinOptions::default());
        let ctx = AgentContext::new(&router, None, "test");
        let result = agent
            .process(crate::payload!({ "order_id": "ORD-9", "type": "carrier_pigeon" }), &ctx)
            .await
            .unwrap();
        assert_eq!(result["type"], "order_confirmation");
        assert_eq!(result["content"]["subject"], "Order Confirmation - ORD-9");
        assert_eq!(result["sent_to"]["email"], "customer@example.com");
    }
}
