//! Host write events to CLI actions.
//!
//! An unacknowledged write to a trigger field (`Nodes.<id>.command.*` or
//! `Chats.<idx>.sendMessage`) is looked up in [`DISPATCH`] by entity kind and field name.
//! Writes that carry no request (`false`, empty text) and writes to any other field are
//! ignored.

use serde_json::Value;

use super::paths::{PathTarget, TreePaths, COMMAND};
use crate::meshtastic::{CliAction, TextTarget};
use crate::storage::WriteEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SendText,
    Ping,
    Traceroute,
    RequestPosition,
    RequestTelemetry,
}

pub const DISPATCH: &[(EntityKind, &str, CommandKind)] = &[
    (EntityKind::Node, "sendMessage", CommandKind::SendText),
    (EntityKind::Node, "sendPing", CommandKind::Ping),
    (EntityKind::Node, "sendTraceRoute", CommandKind::Traceroute),
    (EntityKind::Node, "getLocation", CommandKind::RequestPosition),
    (EntityKind::Node, "getTelemetry", CommandKind::RequestTelemetry),
    (EntityKind::Chat, "sendMessage", CommandKind::SendText),
];

pub fn lookup(entity: EntityKind, field: &str) -> Option<CommandKind> {
    DISPATCH
        .iter()
        .find(|(e, name, _)| *e == entity && *name == field)
        .map(|(_, _, kind)| *kind)
}

/// A translated write: what to run and which field to reset once it succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeCommand {
    pub action: CliAction,
    pub trigger: String,
    /// Idle value of the trigger (`""` for text, `false` for buttons).
    pub reset: Value,
}

pub fn translate(paths: &TreePaths, event: &WriteEvent) -> Option<BridgeCommand> {
    let (entity, field, node, chat) = match paths.parse(&event.path)? {
        PathTarget::NodeField { id, section, field } if section == COMMAND => {
            (EntityKind::Node, field, Some(id), None)
        }
        PathTarget::ChatField { index, field } => (EntityKind::Chat, field, None, Some(index)),
        PathTarget::NodeField { .. } => return None,
    };
    let kind = lookup(entity, field)?;

    let action = match kind {
        CommandKind::SendText => {
            let text = event.value.as_str().filter(|t| !t.trim().is_empty())?;
            let target = match (node, chat) {
                (Some(id), _) => TextTarget::Node(id),
                (None, Some(index)) => TextTarget::Channel(index),
                (None, None) => return None,
            };
            CliAction::SendText {
                target,
                text: text.to_string(),
            }
        }
        button => {
            if event.value != Value::Bool(true) {
                return None;
            }
            let dest = node?;
            match button {
                CommandKind::Ping => CliAction::SendPing { dest },
                CommandKind::Traceroute => CliAction::Traceroute { dest },
                CommandKind::RequestPosition => CliAction::RequestPosition { dest },
                CommandKind::RequestTelemetry => CliAction::RequestTelemetry { dest },
                CommandKind::SendText => return None,
            }
        }
    };

    let reset = match kind {
        CommandKind::SendText => Value::String(String::new()),
        _ => Value::Bool(false),
    };
    Some(BridgeCommand {
        action,
        trigger: event.path.clone(),
        reset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &str, value: Value) -> WriteEvent {
        WriteEvent {
            path: path.to_string(),
            value,
        }
    }

    #[test]
    fn every_node_command_field_is_dispatched() {
        for (field, _, _, _) in crate::bridge::registry::COMMAND_FIELDS {
            assert!(lookup(EntityKind::Node, field).is_some(), "{}", field);
        }
        assert_eq!(lookup(EntityKind::Chat, "sendPing"), None);
    }

    #[test]
    fn button_needs_true() {
        let paths = TreePaths::new("M");
        let path = "M.Nodes.a1b2c3d4.command.sendPing";
        assert!(translate(&paths, &write(path, json!(false))).is_none());
        assert!(translate(&paths, &write(path, json!("true"))).is_none());
        let cmd = translate(&paths, &write(path, json!(true))).unwrap();
        assert_eq!(
            cmd.action,
            CliAction::SendPing {
                dest: "a1b2c3d4".parse().unwrap()
            }
        );
        assert_eq!(cmd.reset, json!(false));
    }

    #[test]
    fn blank_text_and_info_fields_are_ignored() {
        let paths = TreePaths::new("M");
        assert!(translate(&paths, &write("M.Chats.0.sendMessage", json!("  "))).is_none());
        assert!(translate(&paths, &write("M.Chats.0.lastMessage", json!("hi"))).is_none());
        assert!(translate(&paths, &write("M.Nodes.a1b2c3d4.info.user", json!("x"))).is_none());
    }

    #[test]
    fn text_is_sent_as_written() {
        let paths = TreePaths::new("M");
        let cmd = translate(&paths, &write("M.Chats.1.sendMessage", json!("  hi  "))).unwrap();
        assert_eq!(
            cmd.action,
            CliAction::SendText {
                target: TextTarget::Channel(1),
                text: "  hi  ".to_string(),
            }
        );
        assert_eq!(cmd.reset, json!(""));
    }
}
