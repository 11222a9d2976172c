//! # Meshtastic CLI Surface
//!
//! The radio is only reachable through the `meshtastic` command-line tool and the JSON
//! pub/sub feed. This module owns the CLI side: typed actions, the argument vectors they
//! map to, and the process runner that executes them.
//!
//! ## Actions
//!
//! | Action | Arguments (after the device target) |
//! |---|---|
//! | list nodes | `--nodes` |
//! | text to channel | `--ch-index <n> --sendtext <text>` |
//! | text to node | `--dest !<id> --sendtext <text>` |
//! | ping | `--sendping --dest !<id>` |
//! | traceroute | `--traceroute !<id>` |
//! | telemetry request | `--request-telemetry --dest !<id>` |
//! | position request | `--request-position --dest !<id>` |
//!
//! Arguments are always passed as a vector to the process, never through a shell, so
//! message text typed by a user cannot inject commands.
//!
//! ## Submodules
//!
//! - [`table`] - parser for the `--nodes` table
//! - [`node_id`] - canonical node identifiers
//! - [`packet`] - pub/sub JSON packets and topic filtering
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshbridge::meshtastic::{ActionRunner, CliAction, CliRunner, DeviceTarget};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = CliRunner::new("meshtastic", Duration::from_secs(60));
//!     let target = DeviceTarget::Host("192.168.1.10".into());
//!     let output = runner.run(&CliAction::ListNodes.args(&target)).await?;
//!     println!("{}", output);
//!     Ok(())
//! }
//! ```

pub mod node_id;
pub mod packet;
pub mod table;

use async_trait::async_trait;
use log::{debug, trace};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::textutil::truncate_for_log;
pub use node_id::{normalize, NodeId, NodeIdError};

/// How the CLI reaches the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// Network-attached node (`--host <addr>`).
    Host(String),
    /// USB/UART attached node (`--port <path>`).
    Port(String),
}

impl DeviceTarget {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            DeviceTarget::Host(addr) => {
                args.push("--host".into());
                args.push(addr.clone());
            }
            DeviceTarget::Port(path) => {
                args.push("--port".into());
                args.push(path.clone());
            }
        }
    }
}

/// Destination of an outbound text message. Channel and node are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTarget {
    Channel(u32),
    Node(NodeId),
}

/// One CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    ListNodes,
    SendText { target: TextTarget, text: String },
    SendPing { dest: NodeId },
    Traceroute { dest: NodeId },
    RequestTelemetry { dest: NodeId },
    RequestPosition { dest: NodeId },
}

impl CliAction {
    /// Full argument vector including the device target.
    pub fn args(&self, target: &DeviceTarget) -> Vec<String> {
        let mut args = Vec::with_capacity(6);
        target.push_args(&mut args);
        match self {
            CliAction::ListNodes => args.push("--nodes".into()),
            CliAction::SendText { target, text } => {
                match target {
                    TextTarget::Channel(index) => {
                        args.push("--ch-index".into());
                        args.push(index.to_string());
                    }
                    TextTarget::Node(dest) => {
                        args.push("--dest".into());
                        args.push(dest.dest_arg());
                    }
                }
                args.push("--sendtext".into());
                args.push(text.clone());
            }
            CliAction::SendPing { dest } => {
                args.push("--sendping".into());
                args.push("--dest".into());
                args.push(dest.dest_arg());
            }
            CliAction::Traceroute { dest } => {
                args.push("--traceroute".into());
                args.push(dest.dest_arg());
            }
            CliAction::RequestTelemetry { dest } => {
                args.push("--request-telemetry".into());
                args.push("--dest".into());
                args.push(dest.dest_arg());
            }
            CliAction::RequestPosition { dest } => {
                args.push("--request-position".into());
                args.push("--dest".into());
                args.push(dest.dest_arg());
            }
        }
        args
    }

    /// The node sweep only counts as successful when the CLI reports a live connection.
    pub fn requires_connected_marker(&self) -> bool {
        matches!(self, CliAction::ListNodes)
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            CliAction::ListNodes => "list-nodes".to_string(),
            CliAction::SendText {
                target: TextTarget::Channel(i),
                ..
            } => format!("send-text ch{}", i),
            CliAction::SendText {
                target: TextTarget::Node(id),
                ..
            } => format!("send-text !{}", id),
            CliAction::SendPing { dest } => format!("ping !{}", dest),
            CliAction::Traceroute { dest } => format!("traceroute !{}", dest),
            CliAction::RequestTelemetry { dest } => format!("telemetry !{}", dest),
            CliAction::RequestPosition { dest } => format!("position !{}", dest),
        }
    }
}

/// Why a single CLI attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("failed to start CLI: {0}")]
    Spawn(String),

    #[error("CLI exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("CLI reported errors: {0}")]
    Stderr(String),

    #[error("radio not connected (no '{marker}' in output)")]
    NotConnected { marker: String },

    #[error("CLI timed out after {0:?}")]
    Timeout(Duration),
}

/// Executes an argument vector against the radio and returns stdout.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<String, ActionError>;
}

/// Runs the real `meshtastic` binary.
#[derive(Debug, Clone)]
pub struct CliRunner {
    binary: String,
    timeout: Duration,
}

impl CliRunner {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ActionRunner for CliRunner {
    async fn run(&self, args: &[String]) -> Result<String, ActionError> {
        debug!("exec {} {}", self.binary, truncate_for_log(&args.join(" "), 160));
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ActionError::Spawn(e.to_string())),
            Err(_) => return Err(ActionError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        trace!("CLI stdout: {}", truncate_for_log(&stdout, 400));

        if !output.status.success() {
            return Err(ActionError::ExitStatus {
                code: output.status.code(),
                stderr: truncate_for_log(&stderr, 200),
            });
        }
        if !stderr.is_empty() {
            return Err(ActionError::Stderr(truncate_for_log(&stderr, 200)));
        }
        Ok(stdout)
    }
}

/// Check the sweep output for the connection marker (case-insensitive).
pub fn check_connected(output: String, marker: &str) -> Result<String, ActionError> {
    if output.to_lowercase().contains(&marker.to_lowercase()) {
        Ok(output)
    } else {
        Err(ActionError::NotConnected {
            marker: marker.to_string(),
        })
    }
}
