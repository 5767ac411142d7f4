pub mod agents;
pub mod broker;
pub mod consumer;
pub mod error;
pub mod message;
pub mod queue;
