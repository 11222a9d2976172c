mod common;

use meshbridge::bridge::paths::TreePaths;
use meshbridge::bridge::registry::{reconcile, ReconcileReport, COMMAND_FIELDS, INFO_FIELDS};
use meshbridge::meshtastic::node_id::NodeId;
use meshbridge::meshtastic::table::parse_nodes;
use meshbridge::storage::{StateStore, StateTree};
use serde_json::{json, Value};

fn id(raw: &str) -> NodeId {
    raw.parse().unwrap()
}

#[test]
fn powered_battery_counts_as_full() {
    let paths = TreePaths::new("Meshtastic");
    let mut tree = StateStore::new();
    let out = "│ ID │ User │ Battery │\n│ !a1 │ Bob │ Powered │\n";
    let report = reconcile(&mut tree, &paths, parse_nodes(out));
    assert_eq!(
        report,
        ReconcileReport {
            created: 1,
            updated: 0,
            discarded: 0
        }
    );
    let node = id("a1");
    assert_eq!(tree.get_state(&paths.info(&node, "battery")), Some(&json!(100.0)));
    assert_eq!(tree.get_str(&paths.info(&node, "user")), Some("Bob"));
}

#[test]
fn captured_sweep_creates_full_layout() {
    let paths = TreePaths::new("Meshtastic");
    let mut tree = StateStore::new();
    let report = reconcile(&mut tree, &paths, parse_nodes(&common::nodes_output()));
    assert_eq!(report.created, 3);
    assert_eq!(report.discarded, 1);

    assert_eq!(
        tree.children(&paths.nodes()),
        vec!["00c0ffee", "0badf00d", "a1b2c3d4"]
    );
    let base = id("a1b2c3d4");
    for (field, ..) in INFO_FIELDS {
        assert!(tree.exists_object(&paths.info(&base, field)), "info.{}", field);
    }
    for (field, ..) in COMMAND_FIELDS {
        assert!(tree.exists_object(&paths.command(&base, field)), "command.{}", field);
    }

    assert_eq!(tree.get_state(&paths.info(&base, "latitude")), Some(&json!(52.35)));
    assert_eq!(tree.get_state(&paths.info(&base, "longitude")), Some(&json!(13.3)));
    assert_eq!(tree.get_state(&paths.info(&base, "altitude")), Some(&json!(34.0)));
    assert_eq!(tree.get_str(&paths.info(&base, "location")), Some("52.35,13.3"));
    assert_eq!(tree.get_state(&paths.info(&base, "channelUtil")), Some(&json!(12.5)));
    assert_eq!(tree.get_state(&paths.info(&base, "snr")), Some(&json!(0.0)));
    assert_eq!(tree.get_str(&paths.info(&base, "hardware")), Some("HELTEC_V3"));
    assert_eq!(tree.get_str(&paths.info(&base, "alias")), Some("BASE"));

    let rover = id("0badf00d");
    assert_eq!(tree.get_state(&paths.info(&rover, "battery")), Some(&json!(87.0)));
    assert_eq!(tree.get_state(&paths.info(&rover, "snr")), Some(&json!(-6.25)));
    // No fix printed: position stays unset
    assert_eq!(tree.get_state(&paths.info(&rover, "latitude")), Some(&Value::Null));

    let garden = id("00c0ffee");
    assert_eq!(tree.get_state(&paths.info(&garden, "battery")), Some(&json!(100.0)));
    assert_eq!(tree.get_str(&paths.info(&garden, "alias")), Some("N/A"));
}

#[test]
fn second_sweep_updates_in_place() {
    let paths = TreePaths::new("Meshtastic");
    let mut tree = StateStore::new();
    let out = common::nodes_output();
    reconcile(&mut tree, &paths, parse_nodes(&out));
    let objects = tree.len();

    let report = reconcile(&mut tree, &paths, parse_nodes(&out));
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 3);
    assert_eq!(tree.len(), objects);
    assert_eq!(tree.children(&paths.nodes()).len(), 3);
}

#[test]
fn zero_position_keeps_last_fix() {
    let paths = TreePaths::new("");
    let mut tree = StateStore::new();
    let fix = "│ ID │ Latitude │ Longitude │\n│ !a1b2c3d4 │ 52.3500° │ 13.3000° │\n";
    let lost = "│ ID │ Latitude │ Longitude │\n│ !a1b2c3d4 │ 0.0° │ 0.0° │\n";
    reconcile(&mut tree, &paths, parse_nodes(fix));
    reconcile(&mut tree, &paths, parse_nodes(lost));

    let node = id("a1b2c3d4");
    assert_eq!(tree.get_state(&paths.info(&node, "latitude")), Some(&json!(52.35)));
    assert_eq!(tree.get_state(&paths.info(&node, "longitude")), Some(&json!(13.3)));
}

#[test]
fn missing_link_quality_columns_are_not_written() {
    let paths = TreePaths::new("Meshtastic");
    let mut tree = StateStore::new();
    reconcile(
        &mut tree,
        &paths,
        parse_nodes("│ ID │ User │\n│ !a1b2c3d4 │ Bob │\n"),
    );
    let node = id("a1b2c3d4");
    assert_eq!(tree.get_state(&paths.info(&node, "snr")), Some(&Value::Null));
    assert_eq!(tree.get_state(&paths.info(&node, "battery")), Some(&Value::Null));
}
