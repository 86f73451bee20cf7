use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::agent::A2aMessage;

/// Outcome of handing a response to the waiter table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// A blocked caller received the response.
    Delivered,
    /// The request was already answered, or its waiter gave up.
    AlreadySettled,
    /// Nobody was waiting; the caller should route the response normally.
    Unclaimed,
}

#[derive(Default)]
struct WaiterTable {
    waiting: HashMap<String, oneshot::Sender<A2aMessage>>,
    /// Every request id that was answered or abandoned. Never pruned: an id
    /// that left this set could be answered a second time.
    settled: HashSet<String>,
}

/// Request id → suspended caller. Every entry leaves the table exactly once:
/// through [`PendingWaiters::settle`] or when its [`WaiterGuard`] drops.
#[derive(Default)]
pub struct PendingWaiters {
    table: Mutex<WaiterTable>,
}

impl PendingWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: &str) -> (WaiterGuard<'_>, oneshot::Receiver<A2aMessage>) {
        let (tx, rx) = oneshot::channel();
        self.table.lock().waiting.insert(request_id.to_string(), tx);
        (
            WaiterGuard {
                waiters: self,
                request_id: request_id.to_string(),
            },
            rx,
        )
    }

    pub fn settle(&self, request_id: &str, response: A2aMessage) -> Settlement {
        let sender = {
            let mut table = self.table.lock();
            let sender = table.waiting.remove(request_id);
            if sender.is_none() && table.settled.contains(request_id) {
                return Settlement::AlreadySettled;
            }
            table.settled.insert(request_id.to_string());
            sender
        };

        match sender {
            Some(sender) => match sender.send(response) {
                Ok(()) => Settlement::Delivered,
                Err(_) => Settlement::AlreadySettled,
            },
            None => Settlement::Unclaimed,
        }
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.table.lock().waiting.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().waiting.is_empty()
    }

    /// Number of request ids that can no longer be answered.
    pub fn settled_len(&self) -> usize {
        self.table.lock().settled.len()
    }

    fn abandon(&self, request_id: &str) {
        let mut table = self.table.lock();
        table.waiting.remove(request_id);
        table.settled.insert(request_id.to_string());
    }
}

/// Removes its waiter on every exit path: reply, timeout, handler error or the
/// waiting future being dropped.
pub struct WaiterGuard<'a> {
    waiters: &'a PendingWaiters,
    request_id: String,
}

impl WaiterGuard<'_> {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.abandon(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MessageKind, Payload};

    fn response() -> A2aMessage {
        A2aMessage::new("b", "a", MessageKind::Response, Payload::new(), None)
    }

    #[tokio::test]
    async fn settle_delivers_once() {
        let waiters = PendingWaiters::new();
        let (guard, rx) = waiters.register("req-1");
        assert!(waiters.is_pending("req-1"));

        assert_eq!(waiters.settle("req-1", response()), Settlement::Delivered);
        assert_eq!(waiters.settle("req-1", response()), Settlement::AlreadySettled);
        assert!(rx.await.is_ok());
        drop(guard);
        assert!(waiters.is_empty());
    }

    #[test]
    fn dropped_guard_cleans_up_and_blocks_late_replies() {
        let waiters = PendingWaiters::new();
        let (guard, _rx) = waiters.register("req-2");
        drop(guard);
        assert!(!waiters.is_pending("req-2"));
        assert_eq!(waiters.settle("req-2", response()), Settlement::AlreadySettled);
    }

    #[test]
    fn unknown_request_is_unclaimed_then_settled() {
        let waiters = PendingWaiters::new();
        assert_eq!(waiters.settle("req-3", response()), Settlement::Unclaimed);
        assert_eq!(waiters.settle("req-3", response()), Settlement::AlreadySettled);
    }

    #[test]
    fn answered_ids_stay_answered_under_heavy_traffic() {
        let waiters = PendingWaiters::new();
        assert_eq!(waiters.settle("first", response()), Settlement::Unclaimed);
        for n in 0..10_000 {
            let (_guard, _rx) = waiters.register(&format!("req-{n}"));
        }
        assert_eq!(waiters.settle("first", response()), Settlement::AlreadySettled);
        assert_eq!(waiters.settle("req-0", response()), Settlement::AlreadySettled);
        assert_eq!(waiters.settled_len(), 10_001);
        assert!(waiters.is_empty());
    }
}
