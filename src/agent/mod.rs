pub mod agent;
pub mod builtin;
pub mod manifest;
pub mod message;
pub mod registry;

pub use agent::{handler_fn, Agent, AgentContext, AgentHandler, FnHandler, MessageHandler};
pub use manifest::{
    title_case, AgentIdentity, AgentProfile, AgentProfileBuilder, ConnectedAgent, EscalationRule,
    ProfileLoader, ToolBinding,
};
pub use message::{
    decode_payload, encode_payload, error_payload, A2aMessage, MessageKind, Payload, Reply,
};
pub use registry::AgentRegistry;
