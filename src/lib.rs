//! # meshbridge - Meshtastic to Home-Automation Bridge
//!
//! meshbridge mirrors a Meshtastic mesh into the hierarchical key-value state tree of a
//! home-automation host. The radio is reached only through the `meshtastic` command-line
//! tool and a JSON pub/sub feed; the bridge turns both into typed node and chat state and
//! turns host writes back into CLI actions.
//!
//! ## Features
//!
//! - **Node Registry**: Periodic `meshtastic --nodes` sweeps parsed from the box-drawn
//!   table and reconciled into `Nodes.<id>` with create-once, update-in-place semantics.
//! - **Chat Ingestion**: Pub/sub text and position packets resolved to display names and
//!   appended to a bounded newest-first history (JSON and escaped HTML views).
//! - **Resilient Actions**: Messages, pings, traceroutes and telemetry/position requests
//!   run with per-invocation bounded retry while the radio is unreachable.
//! - **Async Design**: One Tokio event loop owns the tree; CLI processes run in spawned
//!   tasks that report back over channels.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshbridge::bridge::BridgeServer;
//! use meshbridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let (_feed_tx, feed_rx) = tokio::sync::mpsc::unbounded_channel();
//!
//!     let mut server = BridgeServer::new(config).await?;
//!     server.run(feed_rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bridge`] - Event loop, retry executor, registry, ingestion, history
//! - [`meshtastic`] - CLI actions and runner, node table parser, node ids, feed packets
//! - [`storage`] - State tree trait and snapshot-persisted store
//! - [`config`] - Configuration management and validation
//! - [`metrics`] - Sync counters
//! - [`textutil`] - Log and HTML escaping
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Bridge Server  │ ← Event loop, owns the tree
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Meshtastic    │ ← CLI process runner, pub/sub packets
//! │   Surface       │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   State Tree    │ ← Host objects + JSON snapshot
//! └─────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod meshtastic;
pub mod metrics;
pub mod storage;
pub mod textutil;
