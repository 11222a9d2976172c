//! Node registry living under `Nodes.<id>` in the state tree.
//!
//! [`reconcile`] folds a sweep's parsed table rows into the registry: unseen nodes get
//! their storage layout first, then every node's fields are overwritten in place. Nodes
//! are never removed here.

use log::{debug, warn};
use serde_json::Value;

use super::paths::{TreePaths, COMMAND, INFO};
use crate::meshtastic::node_id::{normalize, NodeId};
use crate::meshtastic::table::{NodeRecord, PLACEHOLDER};
use crate::storage::{StateCommon, StateTree, ValueType};

/// Read-only node fields: (field, display name, type, role).
pub const INFO_FIELDS: &[(&str, &str, ValueType, &str)] = &[
    ("alias", "Alias", ValueType::String, "text"),
    ("user", "User", ValueType::String, "text"),
    ("latitude", "Latitude", ValueType::Number, "value.gps.latitude"),
    ("longitude", "Longitude", ValueType::Number, "value.gps.longitude"),
    ("location", "Location", ValueType::String, "value.gps"),
    ("altitude", "Altitude", ValueType::Number, "value.gps.elevation"),
    ("battery", "Battery", ValueType::Number, "value.battery"),
    ("lastMessage", "Last message", ValueType::String, "text"),
    ("channelUtil", "Channel utilization", ValueType::Number, "value"),
    ("airUtil", "Tx airtime", ValueType::Number, "value"),
    ("snr", "SNR", ValueType::Number, "value"),
    ("hardware", "Hardware", ValueType::String, "text"),
    ("role", "Role", ValueType::String, "text"),
    ("hops", "Hops", ValueType::String, "text"),
    ("lastHeard", "Last heard", ValueType::String, "text"),
];

/// Write-triggered node actions: (field, display name, type, role).
pub const COMMAND_FIELDS: &[(&str, &str, ValueType, &str)] = &[
    ("sendMessage", "Send direct message", ValueType::String, "text"),
    ("sendPing", "Send ping", ValueType::Boolean, "button"),
    ("sendTraceRoute", "Start traceroute", ValueType::Boolean, "button"),
    ("getLocation", "Request position", ValueType::Boolean, "button"),
    ("getTelemetry", "Request telemetry", ValueType::Boolean, "button"),
];

/// Numeric CLI columns that are copied when the CLI prints them.
const NUMERIC_COLUMNS: &[(&str, &str)] = &[
    ("Channel util.", "channelUtil"),
    ("Tx air util.", "airUtil"),
    ("SNR", "snr"),
];

/// Text CLI columns copied verbatim when present.
const TEXT_COLUMNS: &[(&str, &str)] = &[
    ("User", "user"),
    ("AKA", "alias"),
    ("Hardware", "hardware"),
    ("Role", "role"),
    ("Hops", "hops"),
    ("LastHeard", "lastHeard"),
];

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub discarded: usize,
}

/// Make sure `Nodes.<id>` and all of its states exist. Returns true if the node was new.
///
/// Field creation is repeated for known nodes so entries from older snapshots pick up
/// fields added since.
pub fn ensure_node<T: StateTree + ?Sized>(
    tree: &mut T,
    paths: &TreePaths,
    id: &NodeId,
    display_name: &str,
) -> bool {
    let created = tree.create_channel(&paths.node(id), display_name);
    tree.create_channel(&paths.node_section(id, INFO), "Info");
    tree.create_channel(&paths.node_section(id, COMMAND), "Command");
    for (field, name, value_type, role) in INFO_FIELDS {
        tree.create_state(
            &paths.info(id, field),
            StateCommon::new(name, *value_type, role, false),
        );
    }
    for (field, name, value_type, role) in COMMAND_FIELDS {
        tree.create_state(
            &paths.command(id, field),
            StateCommon::new(name, *value_type, role, true),
        );
    }
    if created {
        debug!("Registered node {} ({})", id, display_name);
    }
    created
}

/// Fold parsed table rows into the registry.
pub fn reconcile<T, I>(tree: &mut T, paths: &TreePaths, records: I) -> ReconcileReport
where
    T: StateTree + ?Sized,
    I: IntoIterator<Item = NodeRecord>,
{
    let mut report = ReconcileReport::default();
    for record in records {
        let id = match record.get("ID").map(normalize) {
            Some(Ok(id)) => id,
            Some(Err(e)) => {
                debug!("Discarding node row: {}", e);
                report.discarded += 1;
                continue;
            }
            None => {
                report.discarded += 1;
                continue;
            }
        };

        let name = record.value("User").unwrap_or(id.as_str()).to_string();
        if ensure_node(tree, paths, &id, &name) {
            report.created += 1;
        } else {
            report.updated += 1;
        }
        apply_record(tree, paths, &id, &record);
    }
    report
}

fn apply_record<T: StateTree + ?Sized>(
    tree: &mut T,
    paths: &TreePaths,
    id: &NodeId,
    record: &NodeRecord,
) {
    for (column, field) in TEXT_COLUMNS {
        if let Some(raw) = record.get(column) {
            let value = if raw.is_empty() { PLACEHOLDER } else { raw };
            write(tree, &paths.info(id, field), Value::from(value));
        }
    }

    let lat = record.get("Latitude").map(parse_number).unwrap_or(0.0);
    let lon = record.get("Longitude").map(parse_number).unwrap_or(0.0);
    let alt = record.get("Altitude").map(parse_number);
    write_position(tree, paths, id, lat, lon, alt);

    if let Some(raw) = record.get("Battery") {
        write(tree, &paths.info(id, "battery"), Value::from(parse_battery(raw)));
    }

    for (column, field) in NUMERIC_COLUMNS {
        if let Some(raw) = record.get(column) {
            write(tree, &paths.info(id, field), Value::from(parse_number(raw)));
        }
    }
}

/// Store a position fix. Returns false (and writes nothing) unless both coordinates are
/// non-zero, so a transient (0,0) never replaces the last good fix.
pub fn write_position<T: StateTree + ?Sized>(
    tree: &mut T,
    paths: &TreePaths,
    id: &NodeId,
    lat: f64,
    lon: f64,
    alt: Option<f64>,
) -> bool {
    if lat == 0.0 || lon == 0.0 {
        return false;
    }
    write(tree, &paths.info(id, "latitude"), Value::from(lat));
    write(tree, &paths.info(id, "longitude"), Value::from(lon));
    write(
        tree,
        &paths.info(id, "location"),
        Value::from(format!("{},{}", lat, lon)),
    );
    if let Some(alt) = alt {
        write(tree, &paths.info(id, "altitude"), Value::from(alt));
    }
    true
}

fn write<T: StateTree + ?Sized>(tree: &mut T, path: &str, value: Value) {
    if let Err(e) = tree.set_state(path, value, true) {
        warn!("Registry write failed: {}", e);
    }
}

/// Lenient number parsing for CLI cells such as `52.3500°`, `87%`, `6.25 dB`.
///
/// Everything except digits, sign and `.` is stripped; empty, placeholder or unparseable
/// input yields 0.
pub fn parse_number(raw: &str) -> f64 {
    if raw == PLACEHOLDER {
        return 0.0;
    }
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Battery percentage; `Powered` (external power) counts as full.
pub fn parse_battery(raw: &str) -> f64 {
    if raw.trim().eq_ignore_ascii_case("Powered") {
        return 100.0;
    }
    parse_number(raw).clamp(0.0, 100.0)
}
