//! The per-queue state machine: FIFO storage, consumer selection,
//! fair-dispatch vs round-robin, ack/nack, expiry and durability.
//!
//! All mutable state sits behind one mutex so publish, dispatch, ack, nack,
//! subscribe and the expiry sweep are mutually exclusive per queue. Delivery
//! itself is a non-blocking channel send; the consumer's connection writer
//! task does the socket IO, so a slow consumer never stalls the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::consumer::{ConsumerHandle, ConsumerId};
use crate::core::message::{current_timestamp, system_notice, Message};
use crate::persistence::SnapshotStore;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Message>,
    in_flight: HashMap<String, Message>,
    consumers: Vec<ConsumerHandle>,
    cursor: usize,
    fair_dispatch: bool,
}

/// A named FIFO channel delivering each message to exactly one of its
/// competing consumers.
///
/// Known gap carried over from the reference behavior: a consumer that
/// vanishes without unsubscribing or nacking leaves its in-flight messages
/// parked until an ack/nack with that id arrives or the queue is deleted.
/// There is no lease or redelivery timer.
#[derive(Debug)]
pub struct MessageQueue {
    name: String,
    durable: bool,
    store: Arc<SnapshotStore>,
    state: Mutex<QueueState>,
}

impl MessageQueue {
    /// Creates a queue; a durable queue immediately reloads its snapshot,
    /// discarding messages that expired while the broker was down.
    pub fn new(name: impl Into<String>, durable: bool, store: Arc<SnapshotStore>) -> Self {
        let name = name.into();
        let mut state = QueueState {
            fair_dispatch: true,
            ..QueueState::default()
        };

        if durable {
            match store.load(&name) {
                Ok(messages) => {
                    let now = current_timestamp();
                    let mut recovered = 0usize;
                    for mut msg in messages {
                        if msg.is_expired(now) {
                            continue;
                        }
                        // In-flight status is not preserved across restarts.
                        msg.delivered = false;
                        state.pending.push_back(msg);
                        recovered += 1;
                    }
                    if recovered > 0 {
                        info!(queue = %name, recovered, "recovered durable messages");
                    }
                }
                Err(e) => warn!(queue = %name, "failed to load snapshot: {e:?}"),
            }
        }

        Self {
            name,
            durable,
            store,
            state: Mutex::new(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn set_fair_dispatch(&self, fair: bool) {
        let mut st = self.state.lock();
        st.fair_dispatch = fair;
        info!(queue = %self.name, fair, "fair dispatch toggled");
    }

    pub fn fair_dispatch(&self) -> bool {
        self.state.lock().fair_dispatch
    }

    /// Messages currently held, pending plus in-flight.
    pub fn message_count(&self) -> usize {
        let st = self.state.lock();
        st.pending.len() + st.in_flight.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.state.lock().consumers.len()
    }

    /// Publishes one message. Admission filtering happens in the broker
    /// before this is called; the queue is policy-agnostic.
    pub fn publish(&self, content: &str, durable: bool) {
        let msg = Message::new(content, durable);
        let persist = durable && self.durable;

        let mut st = self.state.lock();
        if st.consumers.is_empty() {
            info!(
                queue = %self.name,
                id = %msg.id,
                "message stored; it will be dropped in 5 minutes if no consumer arrives"
            );
            st.pending.push_back(msg);
        } else {
            self.dispatch(&mut st, msg);
        }
        let snapshot = persist.then(|| Self::durable_records(&st));
        drop(st);

        if let Some(records) = snapshot {
            self.write_snapshot(&records);
        }
    }

    /// Picks a consumer and attempts delivery of one message.
    ///
    /// Cursor policy: with fair dispatch off the cursor rotates on every
    /// attempt regardless of outcome; with fair dispatch on (the default)
    /// the cursor stays on the same consumer until it acks or nacks, so a
    /// busy consumer gets no more work routed past it.
    fn dispatch(&self, st: &mut QueueState, mut msg: Message) {
        loop {
            if st.consumers.is_empty() {
                msg.delivered = false;
                st.pending.push_back(msg);
                info!(queue = %self.name, "message returned to the queue: no consumers available");
                return;
            }

            if st.cursor >= st.consumers.len() {
                st.cursor = 0;
            }
            let idx = st.cursor;
            let target = st.consumers[idx].clone();

            msg.delivered = true;
            st.in_flight.insert(msg.id.clone(), msg.clone());

            if !st.fair_dispatch {
                st.cursor = (st.cursor + 1) % st.consumers.len();
            }

            match target.deliver(msg.delivery_string()) {
                Ok(()) => {
                    debug!(
                        queue = %self.name,
                        id = %msg.id,
                        consumer = %target.id(),
                        policy = if st.fair_dispatch { "fair" } else { "round-robin" },
                        "message delivered"
                    );
                    return;
                }
                Err(_) => {
                    warn!(
                        queue = %self.name,
                        consumer = %target.id(),
                        "consumer removed due to communication error"
                    );
                    st.in_flight.remove(&msg.id);
                    st.consumers.retain(|c| c.id() != target.id());
                    if st.cursor >= st.consumers.len() {
                        st.cursor = 0;
                    }
                    // retry against the remaining consumers
                }
            }
        }
    }

    /// Acknowledges an in-flight message; terminal, the message is discarded.
    ///
    /// Returns false when the id is not in flight (already acked, expired or
    /// unknown) — an idempotent no-op, not an error.
    pub fn ack(&self, message_id: &str, _consumer: &ConsumerId) -> bool {
        let mut st = self.state.lock();
        let Some(mut msg) = st.in_flight.remove(message_id) else {
            return false;
        };
        msg.acknowledged = true;

        if st.fair_dispatch && !st.consumers.is_empty() {
            st.cursor = (st.cursor + 1) % st.consumers.len();
        }

        let snapshot = (msg.durable && self.durable).then(|| Self::durable_records(&st));
        drop(st);

        info!(queue = %self.name, id = %message_id, "message acknowledged");
        if let Some(records) = snapshot {
            self.write_snapshot(&records);
        }
        true
    }

    /// Rejects an in-flight message, returning it to the tail of the FIFO.
    ///
    /// With fair dispatch on the cursor always advances here, unlike ack's
    /// conditional advance: a poison message repeatedly nacked by one
    /// consumer must not pin the queue to it.
    pub fn nack(&self, message_id: &str, _consumer: &ConsumerId) -> bool {
        let mut st = self.state.lock();
        let Some(mut msg) = st.in_flight.remove(message_id) else {
            return false;
        };
        msg.delivered = false;
        st.pending.push_back(msg);

        if st.fair_dispatch {
            st.cursor = if st.consumers.is_empty() {
                0
            } else {
                (st.cursor + 1) % st.consumers.len()
            };
        }

        info!(queue = %self.name, id = %message_id, "message rejected and returned to the queue");
        true
    }

    /// Registers a consumer and immediately drains what it can of the
    /// pending FIFO, discarding messages found expired along the way.
    pub fn subscribe(&self, consumer: ConsumerHandle) {
        let mut st = self.state.lock();
        st.consumers.push(consumer);
        info!(
            queue = %self.name,
            total = st.consumers.len(),
            policy = if st.fair_dispatch { "fair" } else { "round-robin" },
            "consumer registered"
        );

        let now = current_timestamp();
        while !st.pending.is_empty() && !st.consumers.is_empty() {
            let Some(msg) = st.pending.pop_front() else {
                break;
            };
            if msg.is_expired(now) {
                info!(queue = %self.name, id = %msg.id, "expired message discarded");
                continue;
            }
            self.dispatch(&mut st, msg);
        }
    }

    /// Removes a consumer by identity. An in-flight delivery already sent to
    /// it is not retracted.
    pub fn unsubscribe(&self, consumer: &ConsumerId) -> bool {
        let mut st = self.state.lock();
        let before = st.consumers.len();
        st.consumers.retain(|c| c.id() != consumer);
        let removed = st.consumers.len() < before;

        if removed {
            if st.cursor >= st.consumers.len() {
                st.cursor = 0;
            }
            info!(queue = %self.name, total = st.consumers.len(), "consumer unsubscribed");
        }
        removed
    }

    /// Drops expired pending messages, order-preserving. In-flight messages
    /// are not swept. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = current_timestamp();
        let mut st = self.state.lock();
        let before = st.pending.len();
        st.pending.retain(|msg| {
            if msg.is_expired(now) {
                info!(queue = %self.name, id = %msg.id, "expired message removed");
                false
            } else {
                debug!(
                    queue = %self.name,
                    id = %msg.id,
                    remaining_secs = msg.remaining_secs(now),
                    "message still pending"
                );
                true
            }
        });
        let dropped = before - st.pending.len();

        let snapshot = (dropped > 0 && self.durable).then(|| Self::durable_records(&st));
        drop(st);

        if dropped > 0 {
            info!(queue = %self.name, dropped, "expired messages swept");
        }
        if let Some(records) = snapshot {
            self.write_snapshot(&records);
        }
        dropped
    }

    /// Clears all state, tells every consumer the queue is gone, and removes
    /// the snapshot file of a durable queue.
    pub fn delete(&self) {
        let mut st = self.state.lock();
        st.pending.clear();
        st.in_flight.clear();

        let notice = system_notice(format!("The queue '{}' has been deleted.", self.name));
        for consumer in st.consumers.drain(..) {
            let _ = consumer.deliver(notice.clone());
        }
        drop(st);

        if self.durable {
            if let Err(e) = self.store.delete(&self.name) {
                warn!(queue = %self.name, "failed to delete snapshot: {e:?}");
            }
        }
        info!(queue = %self.name, "queue deleted");
    }

    /// Snapshot payload: the durable, unacknowledged messages currently held
    /// (pending and in-flight alike).
    fn durable_records(st: &QueueState) -> Vec<Message> {
        st.pending
            .iter()
            .chain(st.in_flight.values())
            .filter(|m| m.durable && !m.acknowledged)
            .cloned()
            .collect()
    }

    /// Full rewrite of the queue's snapshot. I/O failure is logged and
    /// swallowed: durability is best-effort, the in-memory state already
    /// settled.
    fn write_snapshot(&self, records: &[Message]) {
        if let Err(e) = self.store.write(&self.name, records) {
            warn!(queue = %self.name, "failed to persist messages: {e:?}");
        } else {
            debug!(queue = %self.name, count = records.len(), "durable messages persisted");
        }
    }

    /// Test hook: pushes a message with a pinned creation time straight into
    /// pending, bypassing dispatch.
    #[doc(hidden)]
    pub fn inject_pending(&self, msg: Message) {
        self.state.lock().pending.push_back(msg);
    }
}
