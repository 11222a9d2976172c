//! Layout of the bridge's objects in the state tree.
//!
//! ```text
//! <root>
//! ├── Nodes
//! │   └── a1b2c3d4
//! │       ├── info.{user, alias, battery, latitude, ...}
//! │       └── command.{sendMessage, sendPing, sendTraceRoute, getLocation, getTelemetry}
//! ├── Chats
//! │   └── 0.{lastMessage, sendMessage, history, history_html}
//! └── stats
//! ```

use crate::meshtastic::node_id::{is_canonical, NodeId};

pub const NODES: &str = "Nodes";
pub const CHATS: &str = "Chats";
pub const INFO: &str = "info";
pub const COMMAND: &str = "command";
pub const STATS: &str = "stats";

/// Path builder/parser bound to a configured root prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePaths {
    root: String,
}

/// A parsed path below `Nodes` or `Chats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget<'a> {
    NodeField {
        id: NodeId,
        section: &'a str,
        field: &'a str,
    },
    ChatField {
        index: u32,
        field: &'a str,
    },
}

impl TreePaths {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn join(&self, rest: &str) -> String {
        if self.root.is_empty() {
            rest.to_string()
        } else {
            format!("{}.{}", self.root, rest)
        }
    }

    pub fn nodes(&self) -> String {
        self.join(NODES)
    }

    pub fn chats(&self) -> String {
        self.join(CHATS)
    }

    /// Counter snapshot written after each sweep.
    pub fn stats(&self) -> String {
        self.join(STATS)
    }

    pub fn node(&self, id: &NodeId) -> String {
        self.join(&format!("{}.{}", NODES, id))
    }

    pub fn node_section(&self, id: &NodeId, section: &str) -> String {
        self.join(&format!("{}.{}.{}", NODES, id, section))
    }

    pub fn info(&self, id: &NodeId, field: &str) -> String {
        self.join(&format!("{}.{}.{}.{}", NODES, id, INFO, field))
    }

    pub fn command(&self, id: &NodeId, field: &str) -> String {
        self.join(&format!("{}.{}.{}.{}", NODES, id, COMMAND, field))
    }

    pub fn chat(&self, index: u32) -> String {
        self.join(&format!("{}.{}", CHATS, index))
    }

    pub fn chat_field(&self, index: u32, field: &str) -> String {
        self.join(&format!("{}.{}.{}", CHATS, index, field))
    }

    /// Split a full path into a node or chat field. Anything else is `None`.
    pub fn parse<'a>(&self, path: &'a str) -> Option<PathTarget<'a>> {
        let rest = if self.root.is_empty() {
            path
        } else {
            path.strip_prefix(self.root.as_str())?.strip_prefix('.')?
        };
        let parts: Vec<&'a str> = rest.split('.').collect();
        match parts.as_slice() {
            &[NODES, id, section, field] if is_canonical(id) => Some(PathTarget::NodeField {
                id: id.parse().ok()?,
                section,
                field,
            }),
            &[CHATS, index, field] => Some(PathTarget::ChatField {
                index: index.parse().ok()?,
                field,
            }),
            _ => None,
        }
    }
}
