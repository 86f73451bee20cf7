use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SalesFlowError};
use crate::utils::ids::{monotonic_now, new_message_id};

/// Structured message body. The router never looks inside it.
pub type Payload = Map<String, Value>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
            MessageKind::Error => "error",
        }
    }

    /// Responses and errors answer a request and always carry a correlation id.
    pub fn is_reply(&self) -> bool {
        matches!(self, MessageKind::Response | MessageKind::Error)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of agent-to-agent communication.
///
/// Messages are immutable once built. The only way to obtain a message with a
/// `correlation_id` is [`A2aMessage::reply_to`], which the router uses when it
/// answers a request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct A2aMessage {
    id: String,
    from_agent: String,
    to_agent: String,
    kind: MessageKind,
    payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl A2aMessage {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        kind: MessageKind,
        payload: Payload,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            id: new_message_id(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            kind,
            payload,
            conversation_id,
            correlation_id: None,
            timestamp: monotonic_now(),
        }
    }

    /// Builds the response (or error) that answers `request`.
    pub(crate) fn reply_to(request: &A2aMessage, reply: Reply) -> Self {
        Self {
            id: new_message_id(),
            from_agent: request.to_agent.clone(),
            to_agent: request.from_agent.clone(),
            kind: reply.kind(),
            payload: reply.payload,
            conversation_id: request.conversation_id.clone(),
            correlation_id: Some(request.id.clone()),
            timestamp: monotonic_now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from_agent(&self) -> &str {
        &self.from_agent
    }

    pub fn to_agent(&self) -> &str {
        &self.to_agent
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn involves(&self, agent: &str) -> bool {
        self.from_agent == agent || self.to_agent == agent
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    /// The `error` text of an error reply, if any.
    pub fn error_text(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }

    pub fn decode<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        decode_payload(&self.payload)
    }
}

/// What a handler answers a request with.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub success: bool,
    pub payload: Payload,
}

impl Reply {
    pub fn ok(payload: Payload) -> Self {
        Self {
            success: true,
            payload,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: error_payload(message),
        }
    }

    pub fn kind(&self) -> MessageKind {
        if self.success {
            MessageKind::Response
        } else {
            MessageKind::Error
        }
    }
}

pub fn error_payload(message: impl Into<String>) -> Payload {
    let mut payload = Payload::new();
    payload.insert("error".into(), Value::String(message.into()));
    payload
}

/// Decodes a payload into an agent's typed request. Shape mismatches are
/// validation failures, not serialization bugs.
pub fn decode_payload<T>(payload: &Payload) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(Value::Object(payload.clone()))
        .map_err(|err| SalesFlowError::Validation(err.to_string()))
}

pub fn encode_payload<T>(value: &T) -> Result<Payload>
where
    T: Serialize,
{
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SalesFlowError::Serialization(format!(
            "payload must be a JSON object, got `{other}`"
        ))),
    }
}

/// `json!({...})` shorthand that yields a [`Payload`].
#[macro_export]
macro_rules! payload {
    ($($json:tt)+) => {
        match ::serde_json::json!($($json)+) {
            ::serde_json::Value::Object(map) => map,
            _ => ::serde_json::Map::new(),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Question {
        question: String,
        #[serde(default)]
        n_results: Option<usize>,
    }

    #[test]
    fn reply_is_correlated_to_request() {
        let request = A2aMessage::new(
            "super_agent",
            "product_policy_agent",
            MessageKind::Request,
            crate::payload!({ "question": "pricing" }),
            Some("CONV-1".into()),
        );
        let reply = A2aMessage::reply_to(&request, Reply::ok(crate::payload!({ "ok": true })));

        assert_eq!(reply.correlation_id(), Some(request.id()));
        assert_eq!(reply.from_agent(), "product_policy_agent");
        assert_eq!(reply.to_agent(), "super_agent");
        assert_eq!(reply.conversation_id(), Some("CONV-1"));
        assert_eq!(reply.kind(), MessageKind::Response);
        assert!(reply.timestamp() > request.timestamp());
    }

    #[test]
    fn error_reply_carries_error_text() {
        let request = A2aMessage::new("a", "b", MessageKind::Request, Payload::new(), None);
        let reply = A2aMessage::reply_to(&request, Reply::error("boom"));
        assert!(reply.is_error());
        assert_eq!(reply.error_text(), Some("boom"));
    }

    #[test]
    fn decode_reports_validation_failure() {
        let payload = crate::payload!({ "n_results": 2 });
        let err = decode_payload::<Question>(&payload).unwrap_err();
        assert!(matches!(err, SalesFlowError::Validation(_)));
    }

    #[test]
    fn encode_rejects_non_objects() {
        assert!(encode_payload(&json!([1, 2, 3])).is_err());
        let payload = encode_payload(&Question {
            question: "sla".into(),
            n_results: None,
        })
        .unwrap();
        assert_eq!(payload.get("question"), Some(&json!("sla")));
    }

    #[test]
    fn message_shape_survives_json() {
        let message = A2aMessage::new(
            "super_agent",
            "echo",
            MessageKind::Notification,
            crate::payload!({ "x": 1 }),
            None,
        );
        let text = serde_json::to_string(&message).unwrap();
        assert!(text.contains("\"kind\":\"notification\""));
        assert!(!text.contains("correlation_id"));
        let back: A2aMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, message);
    }
}
