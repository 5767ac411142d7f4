use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::core::agents::FilterAgent;

/// Ordered collection of admission agents plus an enabled flag.
///
/// Agents are kept sorted by descending priority (stable, so ties keep
/// insertion order). Evaluation requires unanimous acceptance and
/// short-circuits on the first rejection.
#[derive(Debug, Default)]
pub struct AgentChain {
    agents: RwLock<Vec<Arc<dyn FilterAgent>>>,
    enabled: AtomicBool,
}

impl AgentChain {
    pub fn new(enabled: bool) -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn add(&self, agent: Arc<dyn FilterAgent>) {
        let mut agents = self.agents.write();
        info!(
            agent = agent.name(),
            priority = agent.priority(),
            description = %agent.description(),
            "agent attached"
        );
        agents.push(agent);
        agents.sort_by_key(|a| std::cmp::Reverse(a.priority()));
    }

    /// Removes an agent by name; false if no agent carried that name.
    pub fn remove(&self, name: &str) -> bool {
        let mut agents = self.agents.write();
        let before = agents.len();
        agents.retain(|a| a.name() != name);
        agents.len() < before
    }

    /// Snapshot of the current members, priority order.
    pub fn list(&self) -> Vec<Arc<dyn FilterAgent>> {
        self.agents.read().clone()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "agent system toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Runs the chain over one message. A disabled or empty chain accepts
    /// unconditionally; an evaluation error rejects and stops (fail-closed).
    pub fn admit(&self, content: &str, queue_name: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let agents = self.agents.read();
        if agents.is_empty() {
            debug!("no agents configured, accepting message");
            return true;
        }

        for agent in agents.iter() {
            match agent.evaluate(content, queue_name) {
                Ok(true) => {
                    debug!(agent = agent.name(), queue = queue_name, "agent accepted message");
                }
                Ok(false) => {
                    info!(agent = agent.name(), queue = queue_name, "message rejected by agent");
                    return false;
                }
                Err(e) => {
                    warn!(
                        agent = agent.name(),
                        queue = queue_name,
                        "agent evaluation failed, rejecting message: {e:?}"
                    );
                    return false;
                }
            }
        }
        debug!(queue = queue_name, "message accepted by all agents");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed {
        name: &'static str,
        priority: i32,
        // None means evaluation errors out
        verdict: Option<bool>,
    }

    impl Fixed {
        fn accept(name: &'static str, priority: i32) -> Arc<Self> {
            Arc::new(Self { name, priority, verdict: Some(true) })
        }
        fn reject(name: &'static str, priority: i32) -> Arc<Self> {
            Arc::new(Self { name, priority, verdict: Some(false) })
        }
        fn failing(name: &'static str, priority: i32) -> Arc<Self> {
            Arc::new(Self { name, priority, verdict: None })
        }
    }

    impl FilterAgent for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> String {
            "test agent".into()
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn evaluate(&self, _: &str, _: &str) -> anyhow::Result<bool> {
            self.verdict.ok_or_else(|| anyhow::anyhow!("boom"))
        }
    }

    #[test]
    fn empty_chain_accepts() {
        let chain = AgentChain::new(true);
        assert!(chain.admit("anything", "q"));
    }

    #[test]
    fn disabled_chain_accepts_despite_rejecting_member() {
        let chain = AgentChain::new(true);
        chain.add(Fixed::reject("no", 1));
        assert!(!chain.admit("m", "q"));
        chain.set_enabled(false);
        assert!(chain.admit("m", "q"));
    }

    #[test]
    fn evaluation_error_is_fail_closed() {
        let chain = AgentChain::new(true);
        chain.add(Fixed::failing("broken", 1));
        assert!(!chain.admit("m", "q"));
    }

    #[test]
    fn members_sorted_by_descending_priority_stable() {
        let chain = AgentChain::new(true);
        chain.add(Fixed::accept("low", 1));
        chain.add(Fixed::accept("high", 9));
        chain.add(Fixed::accept("mid-a", 5));
        chain.add(Fixed::accept("mid-b", 5));
        let names: Vec<_> = chain.list().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn remove_by_name() {
        let chain = AgentChain::new(true);
        chain.add(Fixed::reject("gate", 1));
        assert!(chain.remove("gate"));
        assert!(!chain.remove("gate"));
        assert!(chain.admit("m", "q"));
    }
}
