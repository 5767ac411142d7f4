//! Admission-agent pipeline.
//!
//! Every publish runs through the [`AgentChain`] before the queue state
//! machine is touched; a message needs unanimous acceptance to be admitted.

pub mod builtin;
pub mod chain;

pub use builtin::{ChannelRulesAgent, ContentAnalysisAgent, LengthFilterAgent, SpamFilterAgent};
pub use chain::AgentChain;

/// One admission check, evaluated against a message and its target queue.
///
/// Implementations are pure functions of content and queue name. Higher
/// priority runs earlier; ties keep insertion order. An `Err` from
/// `evaluate` is treated as a rejection (fail-closed) by the chain.
pub trait FilterAgent: Send + Sync + std::fmt::Debug {
    /// Unique label, used for removal and listing.
    fn name(&self) -> &str;

    /// Human-readable summary of the filtering criterion.
    fn description(&self) -> String;

    /// Higher number runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// `Ok(true)` accepts the message, `Ok(false)` rejects it.
    fn evaluate(&self, content: &str, queue_name: &str) -> anyhow::Result<bool>;
}
