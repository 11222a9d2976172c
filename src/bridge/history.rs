//! Bounded, newest-first chat history per channel.
//!
//! Each channel keeps two derived views in the tree, both regenerated in full on every
//! append: `history` (JSON array, raw text) and `history_html` (escaped markup for a UI
//! widget). A corrupt `history` value is treated as an empty history.

use chrono::{DateTime, Local, TimeZone};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use super::paths::TreePaths;
use crate::storage::{StateTree, StorageError};
use crate::textutil::{escape_html, escape_log};

pub const HISTORY_FIELD: &str = "history";
pub const HISTORY_HTML_FIELD: &str = "history_html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Epoch millis.
    #[serde(rename = "ts")]
    pub timestamp: i64,
    /// Short local time label (`HH:MM`).
    #[serde(rename = "time")]
    pub display_time: String,
    #[serde(rename = "from")]
    pub sender: String,
    pub text: String,
}

impl HistoryEntry {
    pub fn new<Tz: TimeZone>(at: &DateTime<Tz>, sender: &str, text: &str) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            timestamp: at.timestamp_millis(),
            display_time: at.format("%H:%M").to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    max: usize,
}

impl HistoryBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max + 1),
            max,
        }
    }

    /// Rebuild from the persisted JSON view. Unparseable input gives an empty buffer.
    pub fn from_json(raw: &str, max: usize) -> Self {
        let mut buffer = Self::new(max);
        if raw.trim().is_empty() {
            return buffer;
        }
        match serde_json::from_str::<Vec<HistoryEntry>>(raw) {
            Ok(entries) => {
                buffer.entries = entries.into_iter().take(max).collect();
            }
            Err(e) => warn!("Discarding corrupt chat history: {}", e),
        }
        buffer
    }

    /// Insert at the front, evicting the oldest entries beyond the bound.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.max);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from(
            r#"<div style="display:flex;flex-direction:column;gap:10px;font-family:sans-serif;">"#,
        );
        for entry in &self.entries {
            html.push_str(&format!(
                concat!(
                    r#"<div style="background:rgba(128,128,128,0.1);padding:8px 12px;border-radius:12px;max-width:95%;">"#,
                    r#"<div style="font-size:0.75em;opacity:0.6;margin-bottom:4px;"><b>{}</b> • {}</div>"#,
                    r#"<div style="font-size:0.95em;line-height:1.3;">{}</div>"#,
                    "</div>"
                ),
                escape_html(&entry.sender),
                escape_html(&entry.display_time),
                escape_html(&entry.text),
            ));
        }
        html.push_str("</div>");
        html
    }
}

/// Append a message to a channel's history and rewrite both views.
///
/// The channel's `history` and `history_html` states must exist.
pub fn append<T: StateTree + ?Sized>(
    tree: &mut T,
    paths: &TreePaths,
    channel: u32,
    sender: &str,
    text: &str,
    max: usize,
) -> Result<HistoryBuffer, StorageError> {
    append_at(tree, paths, channel, sender, text, max, &Local::now())
}

/// [`append`] with an explicit clock.
pub fn append_at<T: StateTree + ?Sized, Tz: TimeZone>(
    tree: &mut T,
    paths: &TreePaths,
    channel: u32,
    sender: &str,
    text: &str,
    max: usize,
    at: &DateTime<Tz>,
) -> Result<HistoryBuffer, StorageError>
where
    Tz::Offset: std::fmt::Display,
{
    let json_path = paths.chat_field(channel, HISTORY_FIELD);
    let html_path = paths.chat_field(channel, HISTORY_HTML_FIELD);

    let mut buffer = HistoryBuffer::from_json(tree.get_str(&json_path).unwrap_or_default(), max);
    buffer.push(HistoryEntry::new(at, sender, text));

    tree.set_state(&json_path, Value::String(buffer.to_json()), true)?;
    tree.set_state(&html_path, Value::String(buffer.to_html()), true)?;
    log::trace!(
        "History ch{} now {} entries (latest from {})",
        channel,
        buffer.len(),
        escape_log(sender)
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(n: i64) -> HistoryEntry {
        HistoryEntry {
            timestamp: n,
            display_time: "12:00".into(),
            sender: format!("s{}", n),
            text: format!("m{}", n),
        }
    }

    #[test]
    fn json_uses_short_field_names() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 7, 0).unwrap();
        let e = HistoryEntry::new(&at, "Bob", "hi");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["ts"], 1714554420000i64);
        assert_eq!(json["time"], "09:07");
        assert_eq!(json["from"], "Bob");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn oversized_persisted_history_is_cut_on_load() {
        let mut big = HistoryBuffer::new(20);
        for n in 0..20 {
            big.push(entry(n));
        }
        let reloaded = HistoryBuffer::from_json(&big.to_json(), 5);
        assert_eq!(reloaded.len(), 5);
        assert_eq!(reloaded.entries().next().unwrap().timestamp, 19);
    }

    #[test]
    fn corrupt_json_starts_empty() {
        assert!(HistoryBuffer::from_json("{not json", 10).is_empty());
        assert!(HistoryBuffer::from_json("", 10).is_empty());
    }
}
