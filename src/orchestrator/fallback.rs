use std::future::Future;

use tracing::warn;

use crate::agent::{A2aMessage, Payload};
use crate::error::{Result, SalesFlowError};

pub const OFF_TOPIC_REFUSAL: &str = "🚫 **Off-Topic Request**\n\n\
I apologize, but I can only assist with questions about our business internet, voice, and \
communication services. I'm not able to answer questions about other topics.\n\n\
**How can I help you with:**\n\
• Business Internet plans\n\
• Voice services\n\
• Service availability\n\
• Pricing and quotes";

pub const FALLBACK_GREETING: &str = "👋 [Super Agent - Fallback Mode]\n\n\
Hello! I'm here to help you with business internet and communication solutions. \
How can I assist you today?";

pub const DEFAULT_NEXT_ACTIONS: [&str; 3] =
    ["Ask about products", "Check availability", "Get pricing"];

pub const FOLLOW_UP_ACTIONS: [&str; 3] =
    ["Get more details", "Check availability", "Request quote"];

/// Runs `step`; any failure is logged and replaced by `fallback`.
///
/// Every sub-agent call and external capability the orchestrator uses goes
/// through here, so no failure reaches the user as an error.
pub async fn degrade<T, F>(step: &str, future: F, fallback: T) -> T
where
    F: Future<Output = Result<T>>,
{
    degrade_with(step, future, |_| fallback).await
}

/// Like [`degrade`], with the fallback computed from the error.
pub async fn degrade_with<T, F, G>(step: &str, future: F, fallback: G) -> T
where
    F: Future<Output = Result<T>>,
    G: FnOnce(&SalesFlowError) -> T,
{
    match future.await {
        Ok(value) => value,
        Err(err) => {
            warn!(step, error = %err, protocol = err.is_protocol(), "step_degraded");
            fallback(&err)
        }
    }
}

/// Turns an error-kind reply into a `HandlerFailure` so routed business
/// failures degrade the same way protocol failures do.
pub fn successful_payload(reply: Result<A2aMessage>) -> Result<Payload> {
    let message = reply?;
    if message.is_error() {
        return Err(SalesFlowError::HandlerFailure {
            agent: message.from_agent().to_string(),
            message: message
                .error_text()
                .unwrap_or("agent returned an error")
                .to_string(),
        });
    }
    Ok(message.into_payload())
}

const META_PATTERNS: [&str; 6] = [
    "here is the beautifully formatted",
    "here's the formatted",
    "i've formatted",
    "designed for clarity",
    "for professional presentation",
    "using markdown tables and structure",
];

/// Drops leading lines in which the generator talks about its own
/// formatting instead of the content.
pub fn strip_meta_commentary(text: &str) -> String {
    let mut lines: Vec<&str> = text.trim().lines().collect();
    while let Some(first) = lines.first() {
        let lower = first.to_lowercase();
        if META_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
            lines.remove(0);
        } else {
            break;
        }
    }
    lines.join("\n").trim().to_string()
}
