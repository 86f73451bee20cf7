use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::agent::A2aMessage;

/// How much of the message trail the router keeps in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retention {
    Unbounded,
    /// Ring buffer: the oldest message is evicted once the limit is reached.
    Bounded(usize),
}

impl Retention {
    /// `0` means unbounded.
    pub fn from_limit(limit: usize) -> Self {
        if limit == 0 {
            Retention::Unbounded
        } else {
            Retention::Bounded(limit)
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Retention::Bounded(10_000)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HistoryFilter {
    pub conversation_id: Option<String>,
    pub agent: Option<String>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn matches(&self, message: &A2aMessage) -> bool {
        let conversation_ok = match &self.conversation_id {
            Some(id) => message.conversation_id() == Some(id.as_str()),
            None => true,
        };
        let agent_ok = match &self.agent {
            Some(agent) => message.involves(agent),
            None => true,
        };
        conversation_ok && agent_ok
    }
}

/// Append-only record of every message sent or received, in append order.
pub struct MessageHistory {
    entries: RwLock<VecDeque<A2aMessage>>,
    retention: Retention,
}

impl MessageHistory {
    pub fn new(retention: Retention) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            retention,
        }
    }

    pub fn append(&self, message: A2aMessage) {
        let mut entries = self.entries.write();
        if let Retention::Bounded(limit) = self.retention {
            while entries.len() >= limit {
                entries.pop_front();
            }
        }
        entries.push_back(message);
    }

    pub fn query(&self, filter: &HistoryFilter) -> Vec<A2aMessage> {
        self.entries
            .read()
            .iter()
            .filter(|message| filter.matches(message))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }
}
