//! Pub/sub packet ingestion.
//!
//! Each packet is handled on its own: a malformed one is reported as an [`IngestError`]
//! and never affects the next.

use log::{debug, trace};
use serde_json::Value;

use super::history;
use super::paths::TreePaths;
use super::registry::{ensure_node, write_position};
use crate::meshtastic::node_id::{NodeId, NodeIdError};
use crate::meshtastic::packet::{MeshPacket, PacketBody};
use crate::meshtastic::table::PLACEHOLDER;
use crate::storage::StateTree;
use crate::textutil::escape_log;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid sender: {0}")]
    InvalidSender(#[from] NodeIdError),
}

/// What a packet turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Text {
        sender: NodeId,
        channel: u32,
        /// False if the channel is not configured; the node's `lastMessage` is still set.
        to_history: bool,
    },
    Position {
        sender: NodeId,
        lat: f64,
        lon: f64,
    },
    /// Position without a usable fix.
    NoFix { sender: NodeId },
    /// Unhandled packet kind, or a text packet with no text.
    Ignored { kind: String },
}

/// Ingest one JSON packet from the feed.
pub fn ingest<T: StateTree + ?Sized>(
    tree: &mut T,
    paths: &TreePaths,
    history_max: usize,
    payload: &str,
) -> Result<Ingested, IngestError> {
    let packet = MeshPacket::parse(payload).map_err(|e| IngestError::InvalidJson(e.to_string()))?;

    let body = match packet.body() {
        PacketBody::Other(kind) => {
            trace!("Ignoring '{}' packet", escape_log(&kind));
            return Ok(Ingested::Ignored { kind });
        }
        PacketBody::Text(text) if text.is_empty() => {
            trace!("Ignoring text packet without text");
            return Ok(Ingested::Ignored {
                kind: "text".to_string(),
            });
        }
        body => body,
    };

    let sender = packet.sender()?;
    let channel = packet.channel_index();

    match body {
        PacketBody::Text(text) => {
            ensure_node(tree, paths, &sender, sender.as_str());
            let name = resolve_display_name(tree, paths, &sender);
            set(tree, &paths.info(&sender, "lastMessage"), Value::from(text.as_str()));

            let to_history = tree.exists_object(&paths.chat(channel));
            if to_history {
                set(
                    tree,
                    &paths.chat_field(channel, "lastMessage"),
                    Value::from(format!("{}: {}", name, text)),
                );
                if let Err(e) = history::append(tree, paths, channel, &name, &text, history_max) {
                    debug!("History for ch{} not written: {}", channel, e);
                }
            } else {
                debug!("Message on unconfigured channel {} from {}", channel, sender);
            }
            debug!(
                "ch{} <{}> {}",
                channel,
                escape_log(&name),
                escape_log(&text)
            );
            Ok(Ingested::Text {
                sender,
                channel,
                to_history,
            })
        }
        PacketBody::Position(pos) => {
            ensure_node(tree, paths, &sender, sender.as_str());
            let (lat_i, lon_i) = match (pos.latitude_i, pos.longitude_i) {
                (Some(lat), Some(lon)) if lat != 0 && lon != 0 => (lat, lon),
                _ => return Ok(Ingested::NoFix { sender }),
            };
            let lat = lat_i as f64 / 1e7;
            let lon = lon_i as f64 / 1e7;
            let alt = pos.altitude.unwrap_or(0.0);
            write_position(tree, paths, &sender, lat, lon, Some(alt));
            debug!("Position of {}: {},{} ({} m)", sender, lat, lon, alt);
            Ok(Ingested::Position { sender, lat, lon })
        }
        PacketBody::Other(kind) => Ok(Ingested::Ignored { kind }),
    }
}

/// Alias, then user, then the bare identity. Empty and placeholder values don't count.
pub fn resolve_display_name<T: StateTree + ?Sized>(
    tree: &T,
    paths: &TreePaths,
    id: &NodeId,
) -> String {
    ["alias", "user"]
        .iter()
        .filter_map(|field| tree.get_str(&paths.info(id, field)))
        .map(str::trim)
        .find(|v| !v.is_empty() && *v != PLACEHOLDER)
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

fn set<T: StateTree + ?Sized>(tree: &mut T, path: &str, value: Value) {
    if let Err(e) = tree.set_state(path, value, true) {
        debug!("Ingest write skipped: {}", e);
    }
}
