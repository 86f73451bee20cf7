use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Unique id for an A2A message.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Human-readable business id, e.g. `CONV-20250101120000-3F9A1C`.
pub fn generate_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let random = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{timestamp}-{}", &random[..6])
}

/// Wall-clock time that never goes backwards within this process.
///
/// Two calls always return distinct, strictly increasing instants (microsecond
/// resolution), so message timestamps can be used for ordering.
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_TIMESTAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_TIMESTAMP_MICROS.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                return Utc
                    .timestamp_micros(next)
                    .single()
                    .unwrap_or_else(Utc::now)
            }
            Err(observed) => last = observed,
        }
    }
}
