use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SalesFlowError};
use crate::runtime::{A2aRouter, Envelope};

use super::message::{error_payload, A2aMessage, MessageKind, Payload, Reply};

/// Receives every message the router delivers to one agent id.
///
/// A handler either answers synchronously by returning `Some(reply)` or answers
/// later (or never) through [`A2aRouter::send_response`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: A2aMessage, router: &A2aRouter) -> Result<Option<Reply>>;
}

/// What an agent sees while it works on one delivered message.
#[derive(Clone, Copy)]
pub struct AgentContext<'a> {
    pub router: &'a A2aRouter,
    pub conversation_id: Option<&'a str>,
    pub caller: &'a str,
}

impl<'a> AgentContext<'a> {
    pub fn new(router: &'a A2aRouter, conversation_id: Option<&'a str>, caller: &'a str) -> Self {
        Self {
            router,
            conversation_id,
            caller,
        }
    }

    /// Blocking request to another agent within the same conversation.
    pub async fn request(
        &self,
        from: &str,
        to: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<A2aMessage> {
        let mut envelope = Envelope::request(from, to, payload).wait(timeout);
        if let Some(conversation_id) = self.conversation_id {
            envelope = envelope.conversation(conversation_id);
        }
        self.router.expect_reply(envelope).await
    }
}

/// A unit of business logic addressed by a stable name.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn framework(&self) -> &'static str {
        "native"
    }

    async fn process(&self, input: Payload, ctx: &AgentContext<'_>) -> Result<Payload>;

    /// Responses, errors and notifications routed to this agent that no
    /// blocking caller was waiting for.
    async fn on_message(&self, message: A2aMessage, _ctx: &AgentContext<'_>) -> Result<()> {
        debug!(
            agent = %self.name(),
            from_agent = %message.from_agent(),
            message_type = %message.kind(),
            "unsolicited message ignored"
        );
        Ok(())
    }
}

/// Adapts an [`Agent`] to the router's handler contract: every request is
/// answered through `send_response`, and a failing `process` becomes a routed
/// error message instead of escaping into the router.
pub struct AgentHandler<A: ?Sized> {
    agent: Arc<A>,
}

impl<A: ?Sized> AgentHandler<A> {
    pub fn new(agent: Arc<A>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl<A> MessageHandler for AgentHandler<A>
where
    A: Agent + ?Sized + 'static,
{
    async fn handle(&self, message: A2aMessage, router: &A2aRouter) -> Result<Option<Reply>> {
        let agent = self.agent.name();
        info!(
            agent = %agent,
            from_agent = %message.from_agent(),
            message_type = %message.kind(),
            "agent_message_received"
        );
        let ctx = AgentContext::new(router, message.conversation_id(), message.from_agent());

        match message.kind() {
            MessageKind::Request => match self.agent.process(message.payload().clone(), &ctx).await {
                Ok(result) => router.send_response(&message, result, true).await?,
                Err(err) => {
                    error!(agent = %agent, error = %err, "agent_processing_error");
                    router
                        .send_response(&message, error_payload(failure_text(&err)), false)
                        .await?
                }
            },
            _ => {
                if let Err(err) = self.agent.on_message(message.clone(), &ctx).await {
                    warn!(agent = %agent, error = %err, "agent failed to absorb message");
                }
            }
        }
        Ok(None)
    }
}

/// Validation messages are already user-facing and travel without the
/// variant prefix.
fn failure_text(err: &SalesFlowError) -> String {
    match err {
        SalesFlowError::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Handler backed by an async closure; handy for ad-hoc agents and tests.
pub struct FnHandler<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn MessageHandler>
where
    F: Fn(A2aMessage, A2aRouter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Reply>>> + Send + 'static,
{
    Arc::new(FnHandler {
        func,
        _marker: PhantomData,
    })
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(A2aMessage, A2aRouter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Reply>>> + Send + 'static,
{
    async fn handle(&self, message: A2aMessage, router: &A2aRouter) -> Result<Option<Reply>> {
        (self.func)(message, router.clone()).await
    }
}
