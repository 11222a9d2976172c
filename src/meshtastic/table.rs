//! Parser for the box-drawn table printed by `meshtastic --nodes`.
//!
//! ```text
//! ╒════╤══════════╤═══════════╤══════╤═══════════╕
//! │  N │ User     │ ID        │ AKA  │ Battery   │
//! ╞════╪══════════╪═══════════╪══════╪═══════════╡
//! │  1 │ Base     │ !a1b2c3d4 │ BASE │ Powered   │
//! ├────┼──────────┼───────────┼──────┼───────────┤
//! │  2 │ Rover    │ !0badf00d │ RVR  │ 87%       │
//! ╘════╧══════════╧═══════════╧══════╧═══════════╛
//! ```
//!
//! Column names come from the header row, so reordered or missing columns across CLI
//! versions are tolerated. Rows are yielded lazily.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::str::Lines;

/// Column separator used by the CLI table renderer.
pub const COLUMN_SEPARATOR: char = '│';
/// Characters that only appear in horizontal rule lines.
pub const RULE_CHARS: [char; 2] = ['═', '─'];
/// Value stored for a cell the CLI left empty.
pub const PLACEHOLDER: &str = "N/A";

/// One table row: column header -> raw cell text, in header order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeRecord {
    fields: Vec<(String, String)>,
}

impl NodeRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Raw value for a column, `None` if the column was not in the header.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get) but treats the placeholder as absent.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty() && *v != PLACEHOLDER)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for NodeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Lazy iterator over the data rows of a node table.
///
/// Borrows the CLI output and is consumed once.
pub struct NodeRows<'a> {
    columns: Vec<String>,
    lines: Lines<'a>,
}

impl NodeRows<'_> {
    /// Column names discovered in the header row (empty when no header was found).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for NodeRows<'_> {
    type Item = NodeRecord;

    fn next(&mut self) -> Option<NodeRecord> {
        if self.columns.is_empty() {
            return None;
        }
        for line in self.lines.by_ref() {
            if !line.contains(COLUMN_SEPARATOR) || is_rule_line(line) {
                continue;
            }
            let values = split_cells(line);
            if values.len() < self.columns.len() {
                log::trace!("Skipping short node row ({} cells)", values.len());
                continue;
            }
            if values.iter().zip(&self.columns).all(|(v, c)| v == c) {
                continue;
            }
            let fields = self
                .columns
                .iter()
                .zip(values)
                .map(|(column, value)| {
                    let value = if value.is_empty() {
                        PLACEHOLDER.to_string()
                    } else if column == "ID" {
                        value.strip_prefix('!').unwrap_or(&value).to_string()
                    } else {
                        value
                    };
                    (column.clone(), value)
                })
                .collect();
            return Some(NodeRecord { fields });
        }
        None
    }
}

/// Parse the full text output of `meshtastic --nodes`.
///
/// Yields nothing when no header row (a line with `│` and `ID`) is present. Data rows with
/// fewer cells than the header are skipped. A leading `!` on the `ID` cell is removed.
pub fn parse_nodes(text: &str) -> NodeRows<'_> {
    let mut lines = text.lines();
    let mut columns = Vec::new();
    for line in lines.by_ref() {
        if line.contains(COLUMN_SEPARATOR) && line.contains("ID") {
            columns = split_cells(line);
            break;
        }
    }
    NodeRows { columns, lines }
}

fn is_rule_line(line: &str) -> bool {
    line.contains(RULE_CHARS)
}

/// Split on the separator, trim, and drop the segments outside the outer borders.
fn split_cells(line: &str) -> Vec<String> {
    let pieces: Vec<&str> = line.split(COLUMN_SEPARATOR).collect();
    if pieces.len() < 2 {
        return Vec::new();
    }
    pieces[1..pieces.len() - 1]
        .iter()
        .map(|p| p.trim().to_string())
        .collect()
}
