use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::extractor::Entities;
use super::types::{Phase, Role, Turn};

/// Accumulated facts about one conversation plus the bookkeeping for the
/// auxiliary agent calls already made.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationContext {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub employee_count: Option<u32>,
    pub has_address: bool,
    pub has_service_interest: bool,
    pub prospect_requested: bool,
    pub prospect_id: Option<String>,
    pub qualification_status: Option<String>,
    pub lead_requested: bool,
    pub lead_id: Option<String>,
    pub lead_score: Option<u8>,
}

impl ConversationContext {
    /// Newly seen facts win; flags only ever turn on.
    pub fn absorb(&mut self, entities: Entities) {
        if entities.company_name.is_some() {
            self.company_name = entities.company_name;
        }
        if entities.contact_name.is_some() {
            self.contact_name = entities.contact_name;
        }
        if entities.employee_count.is_some() {
            self.employee_count = entities.employee_count;
        }
        self.has_address |= entities.has_address;
        self.has_service_interest |= entities.has_service_interest;
    }

    pub fn wants_prospect(&self) -> bool {
        self.company_name.is_some() && !self.prospect_requested
    }

    pub fn wants_lead(&self) -> bool {
        self.prospect_id.is_some() && self.has_service_interest && !self.lead_requested
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationState {
    pub id: String,
    pub phase: Phase,
    pub context: ConversationContext,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase: Phase::Initial,
            context: ConversationContext::default(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn record(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
    }

    /// `initial -> engaged`; never reverts.
    pub fn engage(&mut self) {
        self.phase = Phase::Engaged;
    }
}

pub type SharedConversation = Arc<Mutex<ConversationState>>;

/// Conversation id -> state. The async mutex per conversation serializes
/// turns of one conversation while different conversations run freely.
#[derive(Default)]
pub struct ConversationTable {
    inner: RwLock<TableInner>,
}

#[derive(Default)]
struct TableInner {
    by_id: HashMap<String, SharedConversation>,
    order: Vec<String>,
}

impl ConversationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: &str) -> SharedConversation {
        if let Some(existing) = self.inner.read().by_id.get(id) {
            return Arc::clone(existing);
        }
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_id.get(id) {
            return Arc::clone(existing);
        }
        let created = Arc::new(Mutex::new(ConversationState::new(id)));
        inner.by_id.insert(id.to_string(), Arc::clone(&created));
        inner.order.push(id.to_string());
        created
    }

    pub fn get(&self, id: &str) -> Option<SharedConversation> {
        self.inner.read().by_id.get(id).map(Arc::clone)
    }

    /// Ids in creation order.
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_keeps_earlier_facts() {
        let mut context = ConversationContext::default();
        context.absorb(Entities {
            company_name: Some("Acme LLC".into()),
            employee_count: Some(12),
            ..Entities::default()
        });
        context.absorb(Entities {
            has_service_interest: true,
            ..Entities::default()
        });
        assert_eq!(context.company_name.as_deref(), Some("Acme LLC"));
        assert_eq!(context.employee_count, Some(12));
        assert!(context.has_service_interest);
        assert!(context.wants_prospect());
        assert!(!context.wants_lead());
    }

    #[test]
    fn table_keeps_creation_order() {
        let table = ConversationTable::new();
        let first = table.get_or_create("b");
        table.get_or_create("a");
        let again = table.get_or_create("b");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(table.ids(), vec!["b".to_string(), "a".to_string()]);
    }
}
