//! Durable queue snapshots.
//!
//! One JSON file per durable queue, addressed deterministically by queue
//! name (`queue_<name>.json`), holding that queue's durable unacknowledged
//! messages. The file is rewritten in full on every durability-relevant
//! mutation, read once when the queue is (re)declared, and deleted with the
//! queue.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::core::message::Message;

const SNAPSHOT_PREFIX: &str = "queue_";
const SNAPSHOT_EXT: &str = ".json";

#[derive(Debug)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    /// Opens (and creates if needed) the snapshot directory.
    pub fn open(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating snapshot dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    fn snapshot_path(&self, queue_name: &str) -> PathBuf {
        self.data_dir
            .join(format!("{SNAPSHOT_PREFIX}{queue_name}{SNAPSHOT_EXT}"))
    }

    /// Rewrites the snapshot for one queue in full.
    pub fn write(&self, queue_name: &str, messages: &[Message]) -> anyhow::Result<()> {
        let path = self.snapshot_path(queue_name);
        let raw = serde_json::to_vec_pretty(messages).context("serializing snapshot")?;
        fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        debug!(queue = queue_name, count = messages.len(), "snapshot written");
        Ok(())
    }

    /// Loads the persisted messages for one queue; a missing file is an
    /// empty queue, not an error.
    pub fn load(&self, queue_name: &str) -> anyhow::Result<Vec<Message>> {
        let path = self.snapshot_path(queue_name);
        if !path.exists() {
            debug!(queue = queue_name, "no snapshot file");
            return Ok(Vec::new());
        }
        let raw = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let messages: Vec<Message> =
            serde_json::from_slice(&raw).context("deserializing snapshot")?;
        Ok(messages)
    }

    /// Removes the snapshot file for a deleted queue, if present.
    pub fn delete(&self, queue_name: &str) -> anyhow::Result<()> {
        let path = self.snapshot_path(queue_name);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            debug!(queue = queue_name, "snapshot deleted");
        }
        Ok(())
    }

    /// Queue names of every snapshot file on disk, for recovery at startup.
    pub fn scan(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)
            .with_context(|| format!("scanning {}", self.data_dir.display()))?
        {
            let entry = entry?;
            if let Some(name) = Self::queue_name_of(&entry.path()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn queue_name_of(path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(SNAPSHOT_EXT)?;
        let name = stem.strip_prefix(SNAPSHOT_PREFIX)?;
        (!name.is_empty()).then(|| name.to_string())
    }
}
