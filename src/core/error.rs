use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum BrokerError {
    QueueNotFound(String),
    ConsumerDisconnected,
    Internal(String), // for any custom internal errors
}

impl std::error::Error for BrokerError {}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::QueueNotFound(name) => write!(f, "Queue '{name}' does not exist"),
            BrokerError::ConsumerDisconnected => write!(f, "Consumer is disconnected"),
            BrokerError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}
