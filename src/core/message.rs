use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every message lives at most this long, counted from creation and
/// independent of delivery state.
pub const MESSAGE_TTL_SECS: u64 = 300;

/// Separates the message id from the content in a delivery string.
/// Ids are UUIDs (or [`SYSTEM_ID`]) and never contain `|`, so splitting on
/// the first occurrence is unambiguous even if the content contains it.
pub const DELIVERY_DELIMITER: &str = "||";

/// Reserved id used for id-less system notices (e.g. queue deletion).
pub const SYSTEM_ID: &str = "SYSTEM";

/// A single queued message together with its lifecycle flags.
///
/// A message is owned by exactly one of the queue's pending FIFO or its
/// in-flight map, never both, and is dropped from both once acknowledged
/// or expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    pub durable: bool,
    pub delivered: bool,
    pub acknowledged: bool,
}

impl Message {
    pub fn new(content: impl Into<String>, durable: bool) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: current_timestamp(),
            durable,
            delivered: false,
            acknowledged: false,
        }
    }

    /// Builds a message with every field pinned; used by recovery and tests
    /// that need a deterministic clock.
    pub fn with_parts(id: impl Into<String>, content: impl Into<String>, created_at: u64, durable: bool) -> Self {
        Message {
            id: id.into(),
            content: content.into(),
            created_at,
            durable,
            delivered: false,
            acknowledged: false,
        }
    }

    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.created_at + MESSAGE_TTL_SECS * 1000
    }

    /// Seconds left before expiry, saturating at zero.
    pub fn remaining_secs(&self, now_ms: u64) -> u64 {
        let deadline = self.created_at + MESSAGE_TTL_SECS * 1000;
        deadline.saturating_sub(now_ms) / 1000
    }

    /// Renders the `id||content` string handed to consumer callbacks.
    pub fn delivery_string(&self) -> String {
        format!("{}{}{}", self.id, DELIVERY_DELIMITER, self.content)
    }
}

pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Builds the system notice sent to consumers of a deleted queue.
pub fn system_notice(text: impl AsRef<str>) -> String {
    format!("{}{}{}", SYSTEM_ID, DELIVERY_DELIMITER, text.as_ref())
}

/// Splits a delivery string back into `(id, content)`.
pub fn split_delivery(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(DELIVERY_DELIMITER)
}
