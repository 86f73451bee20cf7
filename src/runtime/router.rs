use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::agent::{
    A2aMessage, Agent, AgentHandler, AgentRegistry, MessageHandler, MessageKind, Payload, Reply,
};
use crate::error::{Result, SalesFlowError};

use super::history::{HistoryFilter, MessageHistory, Retention};
use super::pending::{PendingWaiters, Settlement};

#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Used when a blocking send does not name its own timeout.
    pub default_timeout: Duration,
    pub retention: Retention,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            retention: Retention::default(),
        }
    }
}

/// Everything needed to build and route one outbound message.
#[derive(Clone, Debug)]
pub struct Envelope {
    from: String,
    to: String,
    kind: MessageKind,
    payload: Payload,
    conversation_id: Option<String>,
    wait_for_response: bool,
    timeout: Option<Duration>,
}

impl Envelope {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        payload: Payload,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            payload,
            conversation_id: None,
            wait_for_response: false,
            timeout: None,
        }
    }

    pub fn request(from: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self::new(from, to, MessageKind::Request, payload)
    }

    pub fn notification(from: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self::new(from, to, MessageKind::Notification, payload)
    }

    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn maybe_conversation(mut self, conversation_id: Option<&str>) -> Self {
        self.conversation_id = conversation_id.map(str::to_string);
        self
    }

    /// Block for the correlated response, at most `timeout`.
    pub fn wait(mut self, timeout: Duration) -> Self {
        self.wait_for_response = true;
        self.timeout = Some(timeout);
        self
    }

    /// Block for the correlated response using the router's default timeout.
    pub fn wait_default(mut self) -> Self {
        self.wait_for_response = true;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.to
    }
}

/// Outcome for one target of [`A2aRouter::request_all`].
#[derive(Debug)]
pub struct FanOutResult {
    pub agent: String,
    pub outcome: Result<A2aMessage>,
}

struct RouterInner {
    registry: AgentRegistry,
    pending: PendingWaiters,
    history: MessageHistory,
    default_timeout: Duration,
}

/// The A2A protocol engine.
///
/// Owns the agent registry, the pending-waiter table and the message history.
/// Cloning is cheap and every clone routes through the same state.
#[derive(Clone)]
pub struct A2aRouter {
    inner: Arc<RouterInner>,
}

impl Default for A2aRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl A2aRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                registry: AgentRegistry::new(),
                pending: PendingWaiters::new(),
                history: MessageHistory::new(config.retention),
                default_timeout: config.default_timeout,
            }),
        }
    }

    pub fn register(&self, agent_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.inner.registry.register(agent_id, handler);
    }

    /// Registers `agent` under its own name, wrapped so that requests are
    /// answered through [`A2aRouter::send_response`].
    pub fn register_agent<A>(&self, agent: Arc<A>)
    where
        A: Agent + 'static,
    {
        let name = agent.name().to_string();
        self.register(name, Arc::new(AgentHandler::new(agent)));
    }

    pub fn unregister(&self, agent_id: &str) {
        self.inner.registry.unregister(agent_id);
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.inner.registry.contains(agent_id)
    }

    pub fn registered_agents(&self) -> Vec<String> {
        self.inner.registry.list()
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Routes one message.
    ///
    /// Returns the correlated reply when the handler answered synchronously or
    /// when the envelope asked to wait for a request's response; `None`
    /// otherwise. Blocking requests fail with `ResponseTimeout` once the
    /// deadline passes; the deadline covers delivery as well as the wait.
    pub async fn send(&self, envelope: Envelope) -> Result<Option<A2aMessage>> {
        let wait = envelope.wait_for_response && envelope.kind == MessageKind::Request;
        let timeout = envelope.timeout.unwrap_or(self.inner.default_timeout);
        let message = self.record_outbound(envelope);
        let handler = self.resolve(&message)?;

        if !wait {
            return self.deliver(handler, message).await;
        }

        let deadline = Instant::now() + timeout;
        // Registered before dispatch so a fast `send_response` finds it.
        let (_guard, receiver) = self.inner.pending.register(message.id());

        match timeout_at(deadline, handler.handle(message.clone(), self)).await {
            Err(_) => return Err(self.timed_out(&message, timeout)),
            Ok(Err(err)) => {
                error!(message_id = %message.id(), error = %err, "a2a_message_delivery_failed");
                return Err(err);
            }
            // The waiter keeps whichever answer settled it first.
            Ok(Ok(Some(reply))) => {
                self.record_reply(&message, reply);
            }
            Ok(Ok(None)) => {}
        }

        match timeout_at(deadline, receiver).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Err(SalesFlowError::ResponseDropped(message.id().to_string())),
            Err(_) => Err(self.timed_out(&message, timeout)),
        }
    }

    /// Blocking send that must produce a correlated reply. An `error` reply is
    /// returned as a message; only protocol failures become `Err`.
    pub async fn expect_reply(&self, envelope: Envelope) -> Result<A2aMessage> {
        if envelope.kind != MessageKind::Request {
            return Err(SalesFlowError::Validation(format!(
                "only requests can wait for a reply, got `{}`",
                envelope.kind
            )));
        }
        let envelope = if envelope.wait_for_response {
            envelope
        } else {
            envelope.wait_default()
        };
        let target = envelope.to.clone();
        self.send(envelope)
            .await?
            .ok_or(SalesFlowError::ResponseDropped(target))
    }

    pub async fn request(
        &self,
        from: &str,
        to: &str,
        payload: Payload,
        conversation_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<A2aMessage> {
        let envelope = Envelope::request(from, to, payload).maybe_conversation(conversation_id);
        let envelope = match timeout {
            Some(timeout) => envelope.wait(timeout),
            None => envelope.wait_default(),
        };
        self.expect_reply(envelope).await
    }

    /// Fans one blocking request out to every target and collects the
    /// outcomes in input order. One failing target never affects the others.
    pub async fn request_all(
        &self,
        from: &str,
        targets: Vec<(String, Payload)>,
        conversation_id: Option<&str>,
        timeout: Duration,
    ) -> Vec<FanOutResult> {
        let calls = targets.into_iter().map(|(agent, payload)| async move {
            let outcome = self
                .request(from, &agent, payload, conversation_id, Some(timeout))
                .await;
            FanOutResult { agent, outcome }
        });
        future::join_all(calls).await
    }

    /// Fire-and-forget. The message is recorded and its target resolved before
    /// returning, so an unknown agent still fails synchronously; delivery runs
    /// on a background task. A request sent this way has its response routed
    /// to the sender's own handler. Must be called within a tokio runtime.
    pub fn notify(&self, envelope: Envelope) -> Result<()> {
        let message = self.record_outbound(envelope);
        let handler = self.resolve(&message)?;
        let router = self.clone();
        tokio::spawn(async move {
            let message_id = message.id().to_string();
            match router.deliver(handler, message).await {
                Ok(Some(response)) => router.forward(response).await,
                Ok(None) => {}
                Err(err) => {
                    warn!(message_id = %message_id, error = %err, "a2a_notify_delivery_failed")
                }
            }
        });
        Ok(())
    }

    /// Answers `original`. A blocked caller is woken exactly once; without a
    /// waiter the response is delivered to the original sender if it is still
    /// registered, and dropped (logged) otherwise. A second answer to the same
    /// request, or one arriving after its waiter timed out, is recorded in
    /// history and goes nowhere else.
    pub async fn send_response(
        &self,
        original: &A2aMessage,
        payload: Payload,
        success: bool,
    ) -> Result<()> {
        if original.kind() != MessageKind::Request {
            warn!(message_id = %original.id(), message_type = %original.kind(), "response to non-request rejected");
            return Err(SalesFlowError::InvalidCorrelation(original.id().to_string()));
        }

        let response = A2aMessage::reply_to(original, Reply { success, payload });
        self.inner.history.append(response.clone());
        info!(
            message_id = %response.id(),
            correlation_id = %original.id(),
            from_agent = %response.from_agent(),
            to_agent = %response.to_agent(),
            message_type = %response.kind(),
            "a2a_response_sent"
        );

        match self.inner.pending.settle(original.id(), response.clone()) {
            Settlement::Delivered => {}
            Settlement::AlreadySettled => {
                warn!(correlation_id = %original.id(), "late or duplicate response not delivered")
            }
            Settlement::Unclaimed => self.forward(response).await,
        }
        Ok(())
    }

    /// Pure filter over the recorded trail, in append order.
    pub fn get_history(&self, filter: &HistoryFilter) -> Vec<A2aMessage> {
        self.inner.history.query(filter)
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, message_id: &str) -> bool {
        self.inner.pending.is_pending(message_id)
    }

    fn record_outbound(&self, envelope: Envelope) -> A2aMessage {
        let message = A2aMessage::new(
            envelope.from,
            envelope.to,
            envelope.kind,
            envelope.payload,
            envelope.conversation_id,
        );
        self.inner.history.append(message.clone());
        info!(
            message_id = %message.id(),
            from_agent = %message.from_agent(),
            to_agent = %message.to_agent(),
            message_type = %message.kind(),
            "a2a_message_sent"
        );
        message
    }

    fn resolve(&self, message: &A2aMessage) -> Result<Arc<dyn MessageHandler>> {
        self.inner.registry.lookup(message.to_agent()).ok_or_else(|| {
            error!(to_agent = %message.to_agent(), message_id = %message.id(), "a2a_agent_not_found");
            SalesFlowError::AgentNotRegistered(message.to_agent().to_string())
        })
    }

    async fn deliver(
        &self,
        handler: Arc<dyn MessageHandler>,
        message: A2aMessage,
    ) -> Result<Option<A2aMessage>> {
        match handler.handle(message.clone(), self).await {
            Ok(Some(reply)) if message.kind() == MessageKind::Request => {
                Ok(self.record_reply(&message, reply))
            }
            Ok(Some(_)) => {
                warn!(message_id = %message.id(), message_type = %message.kind(), "reply to non-request discarded");
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(err) => {
                error!(message_id = %message.id(), error = %err, "a2a_message_delivery_failed");
                Err(err)
            }
        }
    }

    /// Stamps a synchronous reply with the request's id, records it and wakes
    /// any waiter registered for that id. `None` when the request was already
    /// answered through `send_response`; the reply then stays in history only.
    fn record_reply(&self, request: &A2aMessage, reply: Reply) -> Option<A2aMessage> {
        let response = A2aMessage::reply_to(request, reply);
        self.inner.history.append(response.clone());
        match self.inner.pending.settle(request.id(), response.clone()) {
            Settlement::AlreadySettled => {
                warn!(correlation_id = %request.id(), "synchronous reply ignored, request already answered");
                None
            }
            Settlement::Delivered | Settlement::Unclaimed => Some(response),
        }
    }

    /// Ordinary delivery of a reply nobody was blocked on.
    async fn forward(&self, response: A2aMessage) {
        match self.inner.registry.lookup(response.to_agent()) {
            Some(handler) => {
                let message_id = response.id().to_string();
                if let Err(err) = handler.handle(response, self).await {
                    warn!(message_id = %message_id, error = %err, "a2a_response_delivery_failed");
                }
            }
            None => warn!(
                message_id = %response.id(),
                to_agent = %response.to_agent(),
                "a2a_response_dropped"
            ),
        }
    }

    fn timed_out(&self, message: &A2aMessage, timeout: Duration) -> SalesFlowError {
        error!(message_id = %message.id(), to_agent = %message.to_agent(), ?timeout, "a2a_response_timeout");
        SalesFlowError::ResponseTimeout {
            message_id: message.id().to_string(),
            timeout,
        }
    }
}
