//! # Storage Module - State Tree
//!
//! The home-automation host exposes its data as a hierarchical key-value tree of
//! dot-separated paths (`Meshtastic.Nodes.a1b2c3d4.info.battery`). Folders are
//! *channels*; leaves are *states* carrying a JSON value plus host metadata telling the UI
//! how to render and whether it may write.
//!
//! ## Architecture
//!
//! ```text
//! StateTree (trait)       ← what the sync components need from any host
//!     │
//! StateStore              ← in-memory BTreeMap + JSON snapshot on disk
//!     │
//! data/state.json         ← atomic temp-file + rename, exclusively locked while written
//! ```
//!
//! Writes carry an `ack` flag like the host's own API: `ack = true` is the bridge
//! reporting a value, `ack = false` is a user or UI asking for something. Unacknowledged
//! writes are queued as [`WriteEvent`]s for the command dispatcher.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshbridge::storage::{StateCommon, StateStore, StateTree};
//! use serde_json::json;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut store = StateStore::open("data/state.json");
//!     store.create_channel("Meshtastic", "Meshtastic");
//!     store.create_state("Meshtastic.online", StateCommon::boolean("Online", "indicator", false));
//!     store.set_state("Meshtastic.online", json!(true), true)?;
//!     store.save("data/state.json")?;
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use chrono::Utc;
use fs2::FileExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("no state object at '{0}'")]
    UnknownState(String),

    #[error("'{0}' is a channel, not a state")]
    NotAState(String),
}

/// Host value type of a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

/// Host metadata for a state (mirrors the host's `common` block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCommon {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub role: String,
    pub read: bool,
    pub write: bool,
}

impl StateCommon {
    pub fn new(name: &str, value_type: ValueType, role: &str, write: bool) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            role: role.to_string(),
            read: true,
            write,
        }
    }

    pub fn text(name: &str, role: &str, write: bool) -> Self {
        Self::new(name, ValueType::String, role, write)
    }

    pub fn number(name: &str, role: &str) -> Self {
        Self::new(name, ValueType::Number, role, false)
    }

    pub fn boolean(name: &str, role: &str, write: bool) -> Self {
        Self::new(name, ValueType::Boolean, role, write)
    }
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeObject {
    Channel {
        name: String,
    },
    State {
        common: StateCommon,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        ack: bool,
        /// Last write, epoch millis.
        #[serde(default)]
        ts: i64,
    },
}

/// An unacknowledged write, i.e. a request from the host side.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEvent {
    pub path: String,
    pub value: Value,
}

/// What the sync components need from the host's object tree.
pub trait StateTree {
    fn exists_object(&self, path: &str) -> bool;

    /// Create a folder unless something already exists at `path`. Returns true if created.
    fn create_channel(&mut self, path: &str, name: &str) -> bool;

    /// Create a state (value `null`) unless something already exists at `path`.
    fn create_state(&mut self, path: &str, common: StateCommon) -> bool;

    fn get_state(&self, path: &str) -> Option<&Value>;

    fn set_state(&mut self, path: &str, value: Value, ack: bool) -> Result<(), StorageError>;

    /// String value of a state, `None` for missing/non-string values.
    fn get_str(&self, path: &str) -> Option<&str> {
        self.get_state(path).and_then(Value::as_str)
    }
}

/// In-memory tree with JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct StateStore {
    objects: BTreeMap<String, TreeObject>,
    pending_writes: Vec<WriteEvent>,
    dirty: bool,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    saved_at: chrono::DateTime<Utc>,
    objects: BTreeMap<String, TreeObject>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot; a missing or unreadable one yields an empty tree.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No state snapshot at {}, starting empty", path.display());
            return Self::new();
        }
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!("Ignoring unreadable state snapshot {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        // Guard against leading NULs from an interrupted write
        let cleaned = content.trim_start_matches('\0');
        let snapshot: Snapshot = serde_json::from_str(cleaned)?;
        Ok(Self {
            objects: snapshot.objects,
            pending_writes: Vec::new(),
            dirty: false,
        })
    }

    /// Write the snapshot atomically (temp file in the same directory, then rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::fs::{self as sfs, File, OpenOptions};
        use std::io::Write;

        let path_ref = path.as_ref();
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            objects: self.objects.clone(),
        };
        let content = serde_json::to_string_pretty(&snapshot)?;

        let dir = match path_ref.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        sfs::create_dir_all(dir)?;
        let base = path_ref
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("state.json");

        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    tmp.lock_exclusive()?;
                    tmp.write_all(content.as_bytes())?;
                    tmp.flush()?;
                    let _ = tmp.sync_all();
                    let _ = tmp.unlock();
                    break candidate;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                    continue;
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Failed to create temp file for atomic write: {}",
                        e
                    ))
                }
            }
        };

        sfs::rename(&tmp_path, path_ref)?;
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
        Ok(())
    }

    /// True if anything changed since the last [`mark_clean`](Self::mark_clean).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Take all unacknowledged writes queued since the last call.
    pub fn drain_writes(&mut self) -> Vec<WriteEvent> {
        std::mem::take(&mut self.pending_writes)
    }

    pub fn object(&self, path: &str) -> Option<&TreeObject> {
        self.objects.get(path)
    }

    /// Direct children of `path` (one level below, in key order).
    pub fn children(&self, path: &str) -> Vec<&str> {
        let prefix = format!("{}.", path);
        self.objects
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| &k[prefix.len()..])
            .filter(|rest| !rest.contains('.'))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl StateTree for StateStore {
    fn exists_object(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    fn create_channel(&mut self, path: &str, name: &str) -> bool {
        if self.objects.contains_key(path) {
            return false;
        }
        self.objects.insert(
            path.to_string(),
            TreeObject::Channel {
                name: name.to_string(),
            },
        );
        self.dirty = true;
        debug!("Created object: {}", path);
        true
    }

    fn create_state(&mut self, path: &str, common: StateCommon) -> bool {
        if self.objects.contains_key(path) {
            return false;
        }
        self.objects.insert(
            path.to_string(),
            TreeObject::State {
                common,
                value: Value::Null,
                ack: true,
                ts: 0,
            },
        );
        self.dirty = true;
        debug!("Created object: {}", path);
        true
    }

    fn get_state(&self, path: &str) -> Option<&Value> {
        match self.objects.get(path) {
            Some(TreeObject::State { value, .. }) => Some(value),
            _ => None,
        }
    }

    fn set_state(&mut self, path: &str, new_value: Value, new_ack: bool) -> Result<(), StorageError> {
        match self.objects.get_mut(path) {
            Some(TreeObject::State { value, ack, ts, .. }) => {
                *value = new_value.clone();
                *ack = new_ack;
                *ts = Utc::now().timestamp_millis();
                self.dirty = true;
                if !new_ack {
                    self.pending_writes.push(WriteEvent {
                        path: path.to_string(),
                        value: new_value,
                    });
                }
                Ok(())
            }
            Some(TreeObject::Channel { .. }) => Err(StorageError::NotAState(path.to_string())),
            None => Err(StorageError::UnknownState(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_is_idempotent() {
        let mut store = StateStore::new();
        assert!(store.create_state("a.b", StateCommon::text("B", "text", false)));
        store.set_state("a.b", json!("keep"), true).unwrap();
        assert!(!store.create_state("a.b", StateCommon::text("B", "text", false)));
        assert_eq!(store.get_str("a.b"), Some("keep"));
    }

    #[test]
    fn only_unacked_writes_are_queued() {
        let mut store = StateStore::new();
        store.create_state("x", StateCommon::text("X", "text", true));
        store.set_state("x", json!("from bridge"), true).unwrap();
        store.set_state("x", json!("from user"), false).unwrap();
        let writes = store.drain_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].value, json!("from user"));
        assert!(store.drain_writes().is_empty());
    }

    #[test]
    fn set_on_missing_or_channel_fails() {
        let mut store = StateStore::new();
        store.create_channel("folder", "Folder");
        assert_eq!(
            store.set_state("nope", json!(1), true),
            Err(StorageError::UnknownState("nope".into()))
        );
        assert_eq!(
            store.set_state("folder", json!(1), true),
            Err(StorageError::NotAState("folder".into()))
        );
    }

    #[test]
    fn children_lists_one_level() {
        let mut store = StateStore::new();
        store.create_channel("n", "N");
        store.create_channel("n.a", "A");
        store.create_state("n.a.x", StateCommon::number("X", "value"));
        store.create_channel("n.b", "B");
        store.create_channel("nx", "NX");
        assert_eq!(store.children("n"), vec!["a", "b"]);
    }
}
