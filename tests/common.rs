//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use relayq::core::consumer::{ConsumerHandle, ConsumerId};
use relayq::persistence::SnapshotStore;
use relayq::{Broker, Config};
use tokio::sync::mpsc::UnboundedReceiver;

/// A consumer handle plus the receiving end of its delivery channel.
pub fn consumer(name: &str) -> (ConsumerHandle, UnboundedReceiver<String>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (ConsumerHandle::new(ConsumerId::from(name), tx), rx)
}

pub fn store_in(dir: &Path) -> Arc<SnapshotStore> {
    Arc::new(SnapshotStore::open(dir).unwrap())
}

/// Bootstraps a broker whose snapshots live under `dir`.
pub fn broker_in(dir: &Path) -> Arc<Broker> {
    let mut cfg = Config::default();
    cfg.storage.data_dir = dir.to_string_lossy().into_owned();
    Broker::bootstrap(&cfg).unwrap()
}

/// Splits a received delivery string into (id, content).
pub fn delivery_parts(raw: &str) -> (String, String) {
    let (id, content) = relayq::core::message::split_delivery(raw).expect("malformed delivery");
    (id.to_string(), content.to_string())
}
