mod common;

use meshbridge::meshtastic::table::{parse_nodes, PLACEHOLDER};

#[test]
fn minimal_table_yields_one_record() {
    let out = "│ ID │ User │ Battery │\n│ !a1 │ Bob │ Powered │\n";
    let rows: Vec<_> = parse_nodes(out).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ID"), Some("a1"));
    assert_eq!(rows[0].get("User"), Some("Bob"));
    assert_eq!(rows[0].get("Battery"), Some("Powered"));
    assert_eq!(rows[0].len(), 3);
}

#[test]
fn captured_cli_output() {
    let out = common::nodes_output();
    let mut rows = parse_nodes(&out);
    assert_eq!(rows.columns().len(), 15);
    assert_eq!(rows.columns()[2], "ID");

    let base = rows.next().unwrap();
    assert_eq!(base.get("ID"), Some("a1b2c3d4"));
    assert_eq!(base.get("Channel util."), Some("12.50%"));
    assert_eq!(base.get("LastHeard"), Some("2024-05-01 09:07:00"));

    let rest: Vec<_> = rows.collect();
    assert_eq!(rest.len(), 3);
    // Row without an id is still a record; the reconciler discards it.
    assert_eq!(rest[1].get("ID"), Some(PLACEHOLDER));
    // Empty cell becomes the placeholder.
    assert_eq!(rest[2].get("AKA"), Some(PLACEHOLDER));
    assert_eq!(rest[2].value("AKA"), None);
}

#[test]
fn columns_follow_the_header() {
    let out = "\
╒══════╤═══════════╕
│ User │ ID        │
╞══════╪═══════════╡
│ Bob  │ !0badf00d │
╘══════╧═══════════╛
";
    let rows: Vec<_> = parse_nodes(out).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ID"), Some("0badf00d"));
    assert_eq!(rows[0].get("Battery"), None);
}

#[test]
fn short_rows_are_discarded() {
    let out = "│ ID │ User │ Battery │\n│ !a1 │ Bob │\n│ !b2 │ Eve │ 50% │\n";
    let rows: Vec<_> = parse_nodes(out).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("User"), Some("Eve"));
}

#[test]
fn output_without_table_is_empty() {
    assert_eq!(parse_nodes("").count(), 0);
    assert_eq!(parse_nodes("Error: timed out waiting for connection\n").count(), 0);
}
