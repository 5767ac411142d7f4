use std::fmt;
use std::ops::Deref;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::core::error::BrokerError;

/// Unique identifier for a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn random() -> Self {
        ConsumerId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        ConsumerId(s.to_owned())
    }
}

impl From<String> for ConsumerId {
    fn from(s: String) -> Self {
        ConsumerId(s)
    }
}

impl AsRef<str> for ConsumerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ConsumerId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Handle the broker uses to address one subscribed consumer.
///
/// Deliveries are pushed into an unbounded channel whose receiving side is
/// drained by the consumer's connection writer task, so sending never blocks
/// queue operations. A closed channel is the disconnect signal: the queue
/// evicts the consumer and retries elsewhere.
///
/// Identity (and unsubscribe matching) is by id, not by channel.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    id: ConsumerId,
    tx: UnboundedSender<String>,
}

impl ConsumerHandle {
    pub fn new(id: ConsumerId, tx: UnboundedSender<String>) -> Self {
        Self { id, tx }
    }

    #[inline]
    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    /// Hands one `id||content` delivery string to the consumer's channel.
    pub fn deliver(&self, raw: String) -> Result<(), BrokerError> {
        self.tx.send(raw).map_err(|_| BrokerError::ConsumerDisconnected)
    }
}

impl PartialEq for ConsumerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConsumerHandle {}
