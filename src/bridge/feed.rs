//! Inbound events for the bridge loop and the line format of the stdin adapter.
//!
//! ```text
//! msh/EU_868/2/json/LongFast/!a1b2c3d4 {"from":2712847316,"type":"text","payload":{"text":"hi"}}
//! set Meshtastic.Chats.0.sendMessage "hello mesh"
//! set Meshtastic.Nodes.a1b2c3d4.command.sendPing true
//! ```
//!
//! The first form is what `mosquitto_sub -v` prints. Values after `set` are JSON; anything
//! that does not parse is taken as a plain string.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A pub/sub message.
    Publish { topic: String, payload: String },
    /// An unacknowledged write coming from the host side.
    HostWrite { path: String, value: Value },
}

pub fn parse_feed_line(line: &str) -> Option<FeedEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => return None,
    };

    if head == "set" {
        let (path, raw) = rest.split_once(char::is_whitespace)?;
        let raw = raw.trim();
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        return Some(FeedEvent::HostWrite {
            path: path.to_string(),
            value,
        });
    }

    Some(FeedEvent::Publish {
        topic: head.to_string(),
        payload: rest.to_string(),
    })
}
