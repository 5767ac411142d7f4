//! Broker: the queue registry, the agent chain in front of it, and the
//! periodic expiry sweeper.
//!
//! Explicitly constructed and owned (no global instance): build one with
//! [`Broker::bootstrap`], hand it to whatever binds it to a transport, and
//! spawn the sweeper alongside.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::agents::{
    AgentChain, ChannelRulesAgent, ContentAnalysisAgent, FilterAgent, LengthFilterAgent,
    SpamFilterAgent,
};
use crate::core::consumer::{ConsumerHandle, ConsumerId};
use crate::core::error::BrokerError;
use crate::core::queue::MessageQueue;
use crate::persistence::SnapshotStore;

/// Queues declared (durable) on every startup.
pub const DEFAULT_QUEUES: &[&str] = &["notification", "alert", "info", "general"];

#[derive(Debug)]
pub struct Broker {
    queues: DashMap<String, Arc<MessageQueue>>,
    agents: AgentChain,
    store: Arc<SnapshotStore>,
}

impl Broker {
    /// Builds a fully initialized broker: default durable queues declared,
    /// durable queues found on disk recovered, default agents installed.
    /// The caller decides whether to also [`Broker::spawn_sweeper`].
    pub fn bootstrap(config: &Config) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(SnapshotStore::open(&config.storage.data_dir)?);
        let broker = Broker {
            queues: DashMap::new(),
            agents: AgentChain::new(config.agents.enabled),
            store,
        };

        for name in DEFAULT_QUEUES {
            broker.declare_queue(name, true);
        }

        // Recover durable queues left behind by a previous run.
        match broker.store.scan() {
            Ok(names) => {
                for name in names {
                    if !broker.queues.contains_key(&name) {
                        info!(queue = %name, "durable queue recovered from disk");
                    }
                    broker.declare_queue(&name, true);
                }
            }
            Err(e) => warn!("failed to scan for durable queues: {e:?}"),
        }

        broker.install_default_agents();
        Ok(Arc::new(broker))
    }

    /// Attaches the reference agent set in descending priority order.
    pub fn install_default_agents(&self) {
        self.agents.add(Arc::new(SpamFilterAgent::default()));
        self.agents.add(Arc::new(ContentAnalysisAgent));
        self.agents.add(Arc::new(ChannelRulesAgent::default()));
        self.agents.add(Arc::new(LengthFilterAgent::default()));
    }

    /// Spawns the periodic expiry sweep over every queue in the registry.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broker.sweep_all();
            }
        })
    }

    /// One sweep pass over every queue.
    pub fn sweep_all(&self) {
        for entry in self.queues.iter() {
            let queue = entry.value();
            debug!(
                queue = %queue.name(),
                messages = queue.message_count(),
                consumers = queue.consumer_count(),
                "sweeping queue"
            );
            queue.sweep_expired();
        }
    }

    // ───────────────────────────────────────────────────────
    // Queue operations
    // ───────────────────────────────────────────────────────

    /// Idempotent create-if-absent. Re-declaring an existing queue never
    /// alters it, durability flag included.
    pub fn declare_queue(&self, name: &str, durable: bool) {
        self.queues.entry(name.to_string()).or_insert_with(|| {
            info!(queue = name, durable, "queue declared");
            Arc::new(MessageQueue::new(name, durable, Arc::clone(&self.store)))
        });
    }

    /// Drops a queue, notifying its consumers and removing any persisted
    /// snapshot. False if the name was unknown.
    pub fn delete_queue(&self, name: &str) -> bool {
        match self.queues.remove(name) {
            Some((_, queue)) => {
                queue.delete();
                true
            }
            None => false,
        }
    }

    /// Publishes through the agent chain. False when the queue is unknown or
    /// the chain rejects the message; the queue is untouched in both cases.
    pub fn publish(&self, name: &str, content: &str, durable: bool) -> bool {
        let Some(queue) = self.get(name) else {
            return false;
        };
        if !self.agents.admit(content, name) {
            info!(queue = name, "message rejected by agents and not published");
            return false;
        }
        queue.publish(content, durable);
        true
    }

    pub fn subscribe(&self, name: &str, consumer: ConsumerHandle) -> Result<(), BrokerError> {
        let queue = self
            .get(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        queue.subscribe(consumer);
        Ok(())
    }

    pub fn unsubscribe(&self, name: &str, consumer: &ConsumerId) -> bool {
        self.get(name)
            .map(|q| q.unsubscribe(consumer))
            .unwrap_or(false)
    }

    pub fn set_fair_dispatch(&self, name: &str, fair: bool) -> bool {
        match self.get(name) {
            Some(queue) => {
                queue.set_fair_dispatch(fair);
                true
            }
            None => false,
        }
    }

    pub fn ack(&self, name: &str, message_id: &str, consumer: &ConsumerId) -> bool {
        self.get(name)
            .map(|q| q.ack(message_id, consumer))
            .unwrap_or(false)
    }

    pub fn nack(&self, name: &str, message_id: &str, consumer: &ConsumerId) -> bool {
        self.get(name)
            .map(|q| q.nack(message_id, consumer))
            .unwrap_or(false)
    }

    pub fn list_queues(&self) -> Vec<String> {
        self.queues.iter().map(|e| e.key().clone()).collect()
    }

    /// Human-readable summary, or None for an unknown queue.
    pub fn queue_info(&self, name: &str) -> Option<String> {
        let queue = self.get(name)?;
        Some(format!(
            "Queue: {}\nDurable: {}\nMessages: {}\nConsumers: {}\n",
            queue.name(),
            queue.is_durable(),
            queue.message_count(),
            queue.consumer_count(),
        ))
    }

    fn get(&self, name: &str) -> Option<Arc<MessageQueue>> {
        self.queues.get(name).map(|e| Arc::clone(e.value()))
    }

    // ───────────────────────────────────────────────────────
    // Agent operations
    // ───────────────────────────────────────────────────────

    pub fn add_agent(&self, agent: Arc<dyn FilterAgent>) {
        self.agents.add(agent);
    }

    pub fn remove_agent(&self, name: &str) -> bool {
        let removed = self.agents.remove(name);
        if removed {
            info!(agent = name, "agent removed");
        }
        removed
    }

    /// Current agents in evaluation (priority) order.
    pub fn list_agents(&self) -> Vec<Arc<dyn FilterAgent>> {
        self.agents.list()
    }

    pub fn set_agents_enabled(&self, enabled: bool) {
        self.agents.set_enabled(enabled);
    }

    pub fn agents_enabled(&self) -> bool {
        self.agents.is_enabled()
    }
}
