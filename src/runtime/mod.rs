// A2A routing engine: registry, correlation and history.

mod history;
mod pending;
mod router;

pub use history::{HistoryFilter, MessageHistory, Retention};
pub use pending::{PendingWaiters, Settlement, WaiterGuard};
pub use router::{A2aRouter, Envelope, FanOutResult, RouterConfig};
