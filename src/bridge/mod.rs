//! # Bridge Module - Node and Chat Synchronisation
//!
//! Keeps the state tree in step with the mesh:
//!
//! ```text
//!  timer ──► RetryExecutor ──(--nodes)──► table parser ──► registry::reconcile
//!  feed  ──► ingest ──► node fields, chat lastMessage, history
//!  host write ──► commands::translate ──► RetryExecutor ──► trigger reset
//! ```
//!
//! ## Submodules
//!
//! - [`server`] - the event loop owning the tree
//! - [`retry`] - per-invocation bounded retry for CLI actions
//! - [`registry`] - node layout and sweep reconciliation
//! - [`ingest`] - pub/sub packet handling
//! - [`history`] - bounded chat history and its two views
//! - [`commands`] - host write to CLI action dispatch
//! - [`feed`] - event types and the stdin line format
//! - [`paths`] - tree layout

pub mod commands;
pub mod feed;
pub mod history;
pub mod ingest;
pub mod paths;
pub mod registry;
pub mod retry;
pub mod server;

pub use feed::{parse_feed_line, FeedEvent};
pub use paths::TreePaths;
pub use server::BridgeServer;
