//! JSON packets from the pub/sub feed.
//!
//! The feed is produced by the Meshtastic firmware's JSON MQTT output (or a decrypting
//! relay that mimics it) and looks like:
//!
//! ```json
//! {"from": 2712847316, "channel": 1, "type": "text", "payload": {"text": "hi"}}
//! {"from": "!a1b2c3d4", "type": "position",
//!  "payload": {"latitude_i": 523500000, "longitude_i": 133000000, "altitude": 34}}
//! ```

use serde::Deserialize;
use serde_json::Value;

use super::node_id::{normalize, NodeId, NodeIdError};

/// Raw envelope; every field is optional so a partial packet still parses.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MeshPacket {
    #[serde(default)]
    pub channel: Option<Value>,
    #[serde(default)]
    pub from: Option<Value>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Position payload with coordinates in 1e-7 degree units.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq)]
pub struct PositionPayload {
    #[serde(default)]
    pub latitude_i: Option<i64>,
    #[serde(default)]
    pub longitude_i: Option<i64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Decoded packet body.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    Text(String),
    Position(PositionPayload),
    /// Any other packet type, kept by name for logging.
    Other(String),
}

impl MeshPacket {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Channel index; absent, negative or non-numeric values fall back to 0.
    pub fn channel_index(&self) -> u32 {
        match &self.channel {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Sender as a canonical node id. Numbers are node numbers; strings are normalised.
    pub fn sender(&self) -> Result<NodeId, NodeIdError> {
        match &self.from {
            Some(Value::Number(n)) => match n.as_u64().and_then(|v| u32::try_from(v).ok()) {
                Some(num) => Ok(NodeId::from_num(num)),
                None => normalize(&n.to_string()),
            },
            Some(Value::String(s)) => normalize(s),
            _ => Err(NodeIdError::Empty),
        }
    }

    pub fn body(&self) -> PacketBody {
        let kind = self.kind.as_deref().unwrap_or_default();
        match kind {
            "text" => {
                let text = self
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                PacketBody::Text(text.to_string())
            }
            "position" => {
                let pos = self
                    .payload
                    .clone()
                    .and_then(|p| serde_json::from_value::<PositionPayload>(p).ok())
                    .unwrap_or_default();
                PacketBody::Position(pos)
            }
            other => PacketBody::Other(other.to_string()),
        }
    }
}

/// Glob-style filter for feed topics; `*` matches any run of characters, including
/// level separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    pattern: String,
}

impl TopicPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, topic: &str) -> bool {
        glob_match(self.pattern.as_bytes(), topic.as_bytes())
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}
