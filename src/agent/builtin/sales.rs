use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::agent::manifest::{title_case, AgentIdentity};
use crate::agent::{decode_payload, encode_payload, Agent, AgentContext, Payload};
use crate::error::Result;
use crate::utils::generate_id;

use super::{format_currency, round_cents, BuiltinOptions};

pub const SERVICEABLE_ZIPS: [&str; 5] = ["10001", "90001", "60601", "94102", "02101"];

pub const PRICE_BOOK: [(&str, f64); 7] = [
    ("Internet 100", 79.99),
    ("Internet 500", 149.99),
    ("Internet 1 Gig", 249.99),
    ("Business Voice Basic", 29.99),
    ("Business Voice Pro", 49.99),
    ("Managed WiFi", 99.99),
    ("Managed Security", 149.99),
];

const INSTALLATION_FEE: f64 = 99.0;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Retail,
    Healthcare,
    ProfessionalServices,
    Manufacturing,
    Hospitality,
    Education,
    Finance,
    Technology,
    #[default]
    #[serde(other)]
    Other,
}

impl Industry {
    pub fn is_high_value(self) -> bool {
        matches!(
            self,
            Industry::Technology
                | Industry::Finance
                | Industry::Healthcare
                | Industry::ProfessionalServices
        )
    }

    pub fn needs_compliance_review(self) -> bool {
        matches!(self, Industry::Healthcare | Industry::Finance)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    Micro,
    Small,
    Medium,
    Enterprise,
}

impl CompanySize {
    pub fn from_employees(count: u32) -> Self {
        match count {
            0..=10 => CompanySize::Micro,
            11..=50 => CompanySize::Small,
            51..=250 => CompanySize::Medium,
            _ => CompanySize::Enterprise,
        }
    }
}

/// Used when a caller does not say how many employees a company has.
const DEFAULT_EMPLOYEE_COUNT: u32 = 25;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

impl Address {
    pub fn is_complete(&self) -> bool {
        [&self.street, &self.city, &self.state, &self.zip_code]
            .iter()
            .all(|part| !part.trim().is_empty())
    }

    fn standardized(&self) -> Self {
        Self {
            street: self.street.to_uppercase(),
            city: title_words(&self.city),
            state: self.state.to_uppercase(),
            zip_code: self.zip_code.clone(),
        }
    }
}

fn title_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| title_case(&word.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Base 50, adjusted by size, industry, revenue and existing-customer status,
/// clamped to 0..=100.
pub fn score_lead(
    size: CompanySize,
    industry: Industry,
    annual_revenue: Option<f64>,
    existing_customer: bool,
) -> u8 {
    let mut score: i32 = 50;
    score += match size {
        CompanySize::Medium => 20,
        CompanySize::Small => 10,
        CompanySize::Micro | CompanySize::Enterprise => 0,
    };
    if industry.is_high_value() {
        score += 15;
    }
    match annual_revenue {
        Some(revenue) if revenue > 10_000_000.0 => score += 15,
        Some(revenue) if revenue > 1_000_000.0 => score += 10,
        _ => {}
    }
    if existing_customer {
        score -= 30;
    }
    score.clamp(0, 100) as u8
}

pub fn lead_grade(score: u8) -> &'static str {
    match score {
        80.. => "A",
        60..=79 => "B",
        40..=59 => "C",
        _ => "D",
    }
}

pub fn determine_priority(score: u8) -> &'static str {
    match score {
        80.. => "urgent",
        60..=79 => "high",
        40..=59 => "medium",
        _ => "low",
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProspectRequest {
    prospect_id: Option<String>,
    company_name: Option<String>,
    contact_name: Option<String>,
    employee_count: Option<u32>,
    industry: Option<Industry>,
    address: Option<Address>,
}

/// Qualifies business prospects by size and industry.
pub struct ProspectAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl ProspectAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("prospect_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for ProspectAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "ADK"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: ProspectRequest = decode_payload(&input)?;
        info!(company_name = ?request.company_name, "prospect_qualification_started");
        self.options.simulate_delay().await;

        let prospect_id = request
            .prospect_id
            .unwrap_or_else(|| generate_id("PROS"));
        let employee_count = request.employee_count.unwrap_or(DEFAULT_EMPLOYEE_COUNT);
        let industry = request.industry.unwrap_or_default();

        let mut status = "qualified";
        let mut notes = Vec::new();
        if employee_count < 5 {
            status = "not_qualified";
            notes.push("Company too small for SMB (< 5 employees)".to_string());
        } else if employee_count > 250 {
            status = "needs_review";
            notes.push("Enterprise opportunity (> 250 employees)".to_string());
        }
        if industry.needs_compliance_review() {
            let label = serde_json::to_value(industry)?;
            notes.push(format!(
                "Special compliance requirements for {}",
                label.as_str().unwrap_or("regulated industry")
            ));
        }

        info!(prospect_id = %prospect_id, status, "prospect_qualified");
        encode_payload(&json!({
            "prospect_id": prospect_id,
            "company_name": request.company_name.unwrap_or_else(|| "Unknown Company".into()),
            "industry": industry,
            "employee_count": employee_count,
            "company_size": CompanySize::from_employees(employee_count),
            "qualification_status": status,
            "qualification_notes": notes,
            "contact_info": { "name": request.contact_name },
            "address": request.address,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeadRequest {
    prospect_id: Option<String>,
    company_name: Option<String>,
    employee_count: Option<u32>,
    industry: Option<Industry>,
    annual_revenue: Option<f64>,
    existing_customer: bool,
}

/// Scores and enriches leads.
pub struct LeadGenerationAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl LeadGenerationAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("lead_generation_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for LeadGenerationAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "ADK"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: LeadRequest = decode_payload(&input)?;
        info!(prospect_id = ?request.prospect_id, "lead_scoring_started");
        self.options.simulate_delay().await;

        let employee_count = request.employee_count.unwrap_or(DEFAULT_EMPLOYEE_COUNT);
        let size = CompanySize::from_employees(employee_count);
        let industry = request.industry.unwrap_or_default();
        let score = score_lead(size, industry, request.annual_revenue, request.existing_customer);
        let grade = lead_grade(score);
        let estimated_value = request
            .annual_revenue
            .map(|revenue| round_cents(revenue * 0.02))
            .unwrap_or(5000.0);

        let lead_id = generate_id("LEAD");
        info!(lead_id = %lead_id, score, grade, "lead_scored");
        encode_payload(&json!({
            "lead_id": lead_id,
            "prospect_id": request.prospect_id.unwrap_or_else(|| generate_id("PROS")),
            "company_name": request.company_name,
            "lead_score": score,
            "lead_grade": grade,
            "priority": determine_priority(score),
            "estimated_value": estimated_value,
            "probability": f64::from(score) / 100.0,
            "enrichment_data": {
                "industry": industry,
                "employee_count": employee_count,
                "company_size": size,
                "annual_revenue": request.annual_revenue,
            },
            "recommended_products": ["Internet 500", "Business Voice Pro"],
            "next_steps": [
                "Validate address serviceability",
                "Generate personalized offer",
                "Schedule discovery call"
            ],
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceabilityRequest {
    address: Option<Address>,
    zip_code: Option<String>,
    city: Option<String>,
}

/// Checks network coverage by zip code.
pub struct ServiceabilityAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl ServiceabilityAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("serviceability_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for ServiceabilityAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "Strands SDK"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: ServiceabilityRequest = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let address = request.address.unwrap_or_default();
        let zip_code = Some(address.zip_code.clone())
            .filter(|zip| !zip.is_empty())
            .or(request.zip_code);
        let city = Some(address.city.clone())
            .filter(|city| !city.is_empty())
            .or(request.city);
        let serviceable = zip_code
            .as_deref()
            .is_some_and(|zip| SERVICEABLE_ZIPS.contains(&zip));

        info!(zip_code = ?zip_code, serviceable, "serviceability_checked");
        let payload = if serviceable {
            json!({
                "serviceable": true,
                "address": address,
                "zip_code": zip_code,
                "city": city,
                "network_info": {
                    "network_type": "Fiber",
                    "max_bandwidth": "1 Gbps",
                    "availability": "99.99%"
                },
                "available_services": PRICE_BOOK.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
                "installation_timeline": "7-14 business days",
                "notes": "Fiber network available",
            })
        } else {
            json!({
                "serviceable": false,
                "address": address,
                "zip_code": zip_code,
                "city": city,
                "network_info": null,
                "available_services": [],
                "installation_timeline": null,
                "notes": "Address not in current service area",
            })
        };
        encode_payload(&payload)
    }
}

/// Validates and standardizes postal addresses.
pub struct AddressValidationAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl AddressValidationAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("address_validation_agent"),
            options: options.clone(),
        }
    }
}

#[async_trait]
impl Agent for AddressValidationAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "LangGraph"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let address: Address = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let valid = address.is_complete();
        info!(valid, zip_code = %address.zip_code, "address_validated");
        encode_payload(&json!({
            "valid": valid,
            "original_address": address,
            "standardized_address": valid.then(|| address.standardized()),
            "validation_notes": if valid { Vec::new() } else { vec!["Address incomplete or invalid"] },
            "deliverable": valid,
            "business_address": true,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct OfferRequest {
    #[serde(default)]
    lead_id: Option<String>,
    #[serde(default = "default_offer_products")]
    products: Vec<String>,
    #[serde(default = "default_contract_term")]
    contract_term: u32,
}

fn default_offer_products() -> Vec<String> {
    vec!["Internet 500".into(), "Business Voice Basic".into()]
}

fn default_contract_term() -> u32 {
    24
}

/// Prices a product bundle with bundle and contract discounts.
pub struct OfferAgent {
    identity: AgentIdentity,
    options: BuiltinOptions,
}

impl OfferAgent {
    pub fn new(options: &BuiltinOptions) -> Self {
        Self {
            identity: options.identity("offer_agent"),
            options: options.clone(),
        }
    }

    pub fn list_price(product: &str) -> Option<f64> {
        PRICE_BOOK
            .iter()
            .find(|(name, _)| *name == product)
            .map(|(_, price)| *price)
    }
}

#[async_trait]
impl Agent for OfferAgent {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn framework(&self) -> &'static str {
        "Strands SDK"
    }

    async fn process(&self, input: Payload, _ctx: &AgentContext<'_>) -> Result<Payload> {
        let request: OfferRequest = decode_payload(&input)?;
        self.options.simulate_delay().await;

        let unpriced: Vec<&str> = request
            .products
            .iter()
            .map(String::as_str)
            .filter(|product| Self::list_price(product).is_none())
            .collect();
        let monthly_base: f64 = request
            .products
            .iter()
            .filter_map(|product| Self::list_price(product))
            .sum();

        let bundle_discount = if request.products.len() >= 2 { 0.10 } else { 0.0 };
        let contract_discount = if request.contract_term >= 24 { 0.05 } else { 0.0 };
        let discount_amount = round_cents(monthly_base * (bundle_discount + contract_discount));
        let monthly_total = round_cents(monthly_base - discount_amount);
        let installation_fee = if request.products.iter().any(|p| p.contains("Internet")) {
            INSTALLATION_FEE
        } else {
            0.0
        };
        let term = request.contract_term;

        let offer_id = generate_id("OFFER");
        info!(offer_id = %offer_id, monthly_total, "offer_generated");
        encode_payload(&json!({
            "offer_id": offer_id,
            "lead_id": request.lead_id.unwrap_or_else(|| generate_id("LEAD")),
            "products": request.products,
            "unpriced_products": unpriced,
            "pricing": {
                "monthly_base": round_cents(monthly_base),
                "bundle_discount": bundle_discount * 100.0,
                "contract_discount": contract_discount * 100.0,
                "discount_amount": discount_amount,
                "monthly_total": monthly_total,
                "installation_fee": installation_fee,
                "contract_term": term,
            },
            "formatted_pricing": {
                "monthly_base": format_currency(monthly_base),
                "discount_amount": format_currency(discount_amount),
                "monthly_total": format_currency(monthly_total),
                "installation_fee": format_currency(installation_fee),
                "first_year_total": format_currency(monthly_total * 12.0 + installation_fee),
            },
            "terms": {
                "contract_length": format!("{term} months"),
                "early_termination_fee": format_currency(monthly_total * f64::from(term) / 12.0),
                "price_lock": "Guaranteed for contract term",
                "auto_renewal": true,
            },
            "next_steps": [
                "Review offer with prospect",
                "Answer questions",
                "Proceed to order if accepted"
            ],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::A2aRouter;

    fn ctx(router: &A2aRouter) -> AgentContext<'_> {
        AgentContext::new(router, None, "test")
    }

    #[test]
    fn lead_score_follows_rules() {
        assert_eq!(score_lead(CompanySize::Medium, Industry::Technology, Some(20e6), false), 100);
        assert_eq!(score_lead(CompanySize::Small, Industry::Retail, Some(2e6), false), 70);
        assert_eq!(score_lead(CompanySize::Micro, Industry::Other, None, true), 20);
        assert_eq!(lead_grade(80), "A");
        assert_eq!(lead_grade(79), "B");
        assert_eq!(lead_grade(40), "C");
        assert_eq!(lead_grade(39), "D");
        assert_eq!(determine_priority(65), "high");
    }

    #[test]
    fn unknown_industry_maps_to_other() {
        let industry: Industry = serde_json::from_str("\"aerospace\"").unwrap();
        assert_eq!(industry, Industry::Other);
    }

    #[tokio::test]
    async fn prospect_small_company_not_qualified() {
        let router = A2aRouter::default();
        let agent = ProspectAgent::new(&BuiltinOptions::default());
        let result = agent
            .process(
                crate::payload!({ "company_name": "Acme LLC", "employee_count": 3, "industry": "finance" }),
                &ctx(&router),
            )
            .await
            .unwrap();
        assert_eq!(result["qualification_status"], "not_qualified");
        assert_eq!(result["company_size"], "micro");
        let notes = result["qualification_notes"].as_array().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1], "Special compliance requirements for finance");
    }

    #[tokio::test]
    async fn offer_applies_bundle_contract_and_install() {
        let router = A2aRouter::default();
        let agent = OfferAgent::new(&BuiltinOptions::default());
        let result = agent
            .process(
                crate::payload!({ "products": ["Internet 100", "Business Voice Basic"], "contract_term": 36 }),
                &ctx(&router),
            )
            .await
            .unwrap();
        let pricing = &result["pricing"];
        assert_eq!(pricing["monthly_base"], 109.98);
        assert_eq!(pricing["discount_amount"], 16.5);
        assert_eq!(pricing["monthly_total"], 93.48);
        assert_eq!(pricing["installation_fee"], 99.0);
        assert_eq!(result["formatted_pricing"]["monthly_total"], "$93.48");
    }

    #[tokio::test]
    async fn serviceability_by_zip() {
        let router = A2aRouter::default();
        let agent = ServiceabilityAgent::new(&BuiltinOptions::default());
        let covered = agent
            .process(crate::payload!({ "address": { "zip_code": "94102" } }), &ctx(&router))
            .await
            .unwrap();
        assert_eq!(covered["serviceable"], true);
        let uncovered = agent
            .process(crate::payload!({ "zip_code": "73301" }), &ctx(&router))
            .await
            .unwrap();
        assert_eq!(uncovered["serviceable"], false);
        assert_eq!(uncovered["notes"], "Address not in current service area");
    }

    #[tokio::test]
    async fn address_is_standardized_when_complete() {
        let router = A2aRouter::default();
        let agent = AddressValidationAgent::new(&BuiltinOptions::default());
        let result = agent
            .process(
                crate::payload!({ "street": "1 main st", "city": "san francisco", "state": "ca", "zip_code": "94102" }),
                &ctx(&router),
            )
            .await
            .unwrap();
        assert_eq!(result["valid"], true);
        assert_eq!(result["standardized_address"]["street"], "1 MAIN ST");
        assert_eq!(result["standardized_address"]["city"], "San Francisco");

        let partial = agent
            .process(crate::payload!({ "street": "1 main st" }), &ctx(&router))
            .await
            .unwrap();
        assert_eq!(partial["valid"], false);
        assert!(partial["standardized_address"].is_null());
    }
}
