//! Canonical mesh node identifiers.
//!
//! The CLI prints nodes as `!a1b2c3d4`, the pub/sub feed carries the sender as a decimal
//! node number (`2712847316`) or occasionally as a hex string. Everything that keys the
//! registry goes through [`normalize`] so both spellings land on the same entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a canonical identifier in hex digits.
pub const NODE_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeIdError {
    #[error("node id is empty")]
    Empty,

    #[error("node id '{raw}' does not normalise to 8 hex digits (got '{normalized}')")]
    Invalid { raw: String, normalized: String },
}

/// Exactly eight lowercase hex characters, no sigil.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Build from a numeric node number as carried in pub/sub payloads.
    pub fn from_num(num: u32) -> Self {
        NodeId(format!("{:08x}", num))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `!xxxxxxxx` form the CLI expects after `--dest`.
    pub fn dest_arg(&self) -> String {
        format!("!{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize(&value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl std::str::FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

/// True for strings already in canonical form.
pub fn is_canonical(s: &str) -> bool {
    s.len() == NODE_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Normalise a raw identifier from either the CLI or the pub/sub feed.
///
/// One leading sigil (`!`, `^`, `#`, ...) is dropped. A `0x` prefix or an exact 8-digit
/// width marks the remainder as hex; otherwise an all-decimal remainder is a node number
/// and is rendered in hex. The result is lowercased, left-padded with `0` and rejected
/// unless it is exactly 8 hex digits.
///
/// An 8-character all-digit string is therefore read as hex, so canonical ids stay
/// unchanged under a second `normalize`. Decimal node numbers of that width must be
/// passed as numbers through [`NodeId::from_num`]; as strings they key a different node.
pub fn normalize(raw: &str) -> Result<NodeId, NodeIdError> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let body = match chars.next() {
        Some(c) if c.is_ascii_punctuation() => chars.as_str(),
        Some(_) => trimmed,
        None => return Err(NodeIdError::Empty),
    };
    if body.is_empty() {
        return Err(NodeIdError::Empty);
    }

    let lower = body.to_ascii_lowercase();
    let hex = if let Some(stripped) = lower.strip_prefix("0x") {
        if stripped.is_empty() {
            return Err(NodeIdError::Empty);
        }
        stripped.to_string()
    } else if lower.len() != NODE_ID_LEN && lower.bytes().all(|b| b.is_ascii_digit()) {
        match lower.parse::<u64>() {
            Ok(n) => format!("{:x}", n),
            Err(_) => {
                return Err(NodeIdError::Invalid {
                    raw: raw.to_string(),
                    normalized: lower,
                })
            }
        }
    } else {
        lower
    };

    let padded = format!("{:0>width$}", hex, width = NODE_ID_LEN);
    if is_canonical(&padded) {
        Ok(NodeId(padded))
    } else {
        Err(NodeIdError::Invalid {
            raw: raw.to_string(),
            normalized: padded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_and_feed_forms_agree() {
        let from_cli = normalize("!a1b2c3d4").unwrap();
        let from_feed = normalize("2712847316").unwrap();
        assert_eq!(from_cli, from_feed);
        assert_eq!(NodeId::from_num(2712847316), from_cli);
    }

    #[test]
    fn short_hex_is_padded() {
        assert_eq!(normalize("!a1").unwrap().as_str(), "000000a1");
        assert_eq!(normalize("0xBEEF").unwrap().as_str(), "0000beef");
    }

    #[test]
    fn rejects_garbage() {
        assert!(normalize("").is_err());
        assert!(normalize("!").is_err());
        assert!(normalize("!zz12").is_err());
        assert!(normalize("123456789012").is_err());
        assert!(normalize("!abcdef012").is_err());
    }

    #[test]
    fn eight_digit_strings_are_hex() {
        let id = normalize("12345678").unwrap();
        assert_eq!(id.as_str(), "12345678");
        assert_eq!(normalize(id.as_str()).unwrap(), id);
        assert_eq!(NodeId::from_num(12345678).as_str(), "00bc614e");
    }

    #[test]
    fn dest_arg_has_sigil() {
        assert_eq!(normalize("a1").unwrap().dest_arg(), "!000000a1");
    }
}
