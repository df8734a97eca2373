//! Message identity.
//!
//! History replacement is "remove everything, then append the new list", and
//! the caller's merge logic tracks messages by id. Messages arriving without
//! one get a fresh id before compaction so every message in the replacement
//! list is addressable.

use crate::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a process-unique message id.
pub fn generate_message_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates calls within the same nanosecond.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("msg-{ts:x}-{count:04x}")
}

/// Return a copy of `messages` where every message has an id. Existing ids
/// are kept as-is; the input is not touched.
pub fn assign_missing_ids(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| match m.id {
            Some(_) => m.clone(),
            None => m.clone().with_id(generate_message_id()),
        })
        .collect()
}
