use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::agent::MessageHandler;

/// Name-keyed table of the handlers currently receiving messages.
///
/// Lookups hand out a cloned `Arc`, so a delivery already dispatched keeps
/// running against the handler it captured even if the name is re-registered
/// or removed meanwhile.
#[derive(Default)]
pub struct AgentRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or silently replaces the handler for `agent_id`.
    pub fn register(&self, agent_id: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let agent_id = agent_id.into();
        let replaced = self
            .handlers
            .write()
            .insert(agent_id.clone(), handler)
            .is_some();
        info!(agent_name = %agent_id, replaced, "agent_registered");
    }

    pub fn unregister(&self, agent_id: &str) {
        if self.handlers.write().remove(agent_id).is_some() {
            info!(agent_name = %agent_id, "agent_unregistered");
        }
    }

    pub fn lookup(&self, agent_id: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.read().get(agent_id).map(Arc::clone)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.handlers.read().contains_key(agent_id)
    }

    /// Registered agent ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
