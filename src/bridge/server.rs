//! The bridge event loop.
//!
//! [`BridgeServer`] owns the state tree. Everything that touches it (sweep results, feed
//! packets, host writes, trigger resets) runs on the loop in [`BridgeServer::run_until`]
//! one event at a time. CLI work happens in tasks spawned by the [`RetryExecutor`], which
//! report back over a channel.

use anyhow::{anyhow, Result};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::commands::translate;
use super::feed::FeedEvent;
use super::history::{HISTORY_FIELD, HISTORY_HTML_FIELD};
use super::ingest::ingest;
use super::paths::TreePaths;
use super::registry::reconcile;
use super::retry::{AttemptReport, Completed, Completion, RetryExecutor, RetryPolicy};
use crate::config::Config;
use crate::meshtastic::packet::TopicPattern;
use crate::meshtastic::table::parse_nodes;
use crate::meshtastic::{ActionRunner, CliAction, CliRunner};
use crate::metrics;
use crate::storage::{StateCommon, StateStore, StateTree};
use crate::textutil::escape_log;

pub struct BridgeServer {
    config: Config,
    paths: TreePaths,
    store: StateStore,
    state_file: PathBuf,
    topic: TopicPattern,
    executor: RetryExecutor,
    reports: Option<mpsc::UnboundedReceiver<AttemptReport>>,
}

impl BridgeServer {
    /// Build a server around the real CLI and the configured snapshot file.
    pub async fn new(config: Config) -> Result<Self> {
        let runner = Arc::new(CliRunner::new(
            config.device.cli_path.clone(),
            config.device.cli_timeout(),
        ));
        let store = StateStore::open(&config.storage.state_file);
        Self::with_runner(config, runner, store)
    }

    /// Build a server with any [`ActionRunner`] and a preloaded tree.
    pub fn with_runner(
        config: Config,
        runner: Arc<dyn ActionRunner>,
        store: StateStore,
    ) -> Result<Self> {
        config.validate()?;
        let target = config.device.target()?;
        let (executor, reports) = RetryExecutor::new(
            runner,
            target,
            config.device.connected_marker.clone(),
            RetryPolicy::from_config(&config.retry),
        );
        let mut server = Self {
            paths: TreePaths::new(config.storage.root.clone()),
            state_file: PathBuf::from(&config.storage.state_file),
            topic: TopicPattern::new(config.feed.topic_pattern.clone()),
            config,
            store,
            executor,
            reports: Some(reports),
        };
        server.init_structure();
        Ok(server)
    }

    pub fn paths(&self) -> &TreePaths {
        &self.paths
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Take the attempt report channel to drive the server by hand instead of through
    /// [`run_until`](Self::run_until), which needs it.
    pub fn take_reports(&mut self) -> Option<mpsc::UnboundedReceiver<AttemptReport>> {
        self.reports.take()
    }

    /// Create the fixed folders and one subtree per configured chat. Existing objects
    /// (and their values) are left alone.
    pub fn init_structure(&mut self) {
        let paths = self.paths.clone();
        if !paths.root().is_empty() {
            self.store.create_channel(paths.root(), paths.root());
        }
        self.store.create_channel(&paths.nodes(), "Nodes");
        self.store.create_channel(&paths.chats(), "Chats");
        self.store.create_state(
            &paths.stats(),
            StateCommon::text("Sync counters", "json", false),
        );

        for chat in &self.config.chats {
            let i = chat.index;
            self.store.create_channel(&paths.chat(i), &chat.name);
            self.store.create_state(
                &paths.chat_field(i, "lastMessage"),
                StateCommon::text("Last message", "text", false),
            );
            self.store.create_state(
                &paths.chat_field(i, "sendMessage"),
                StateCommon::text("Send message", "text", true),
            );
            self.store.create_state(
                &paths.chat_field(i, HISTORY_FIELD),
                StateCommon::text("History", "json", false),
            );
            self.store.create_state(
                &paths.chat_field(i, HISTORY_HTML_FIELD),
                StateCommon::text("History (HTML)", "html", false),
            );
        }
    }

    /// Run until Ctrl-C.
    pub async fn run(&mut self, feed: mpsc::UnboundedReceiver<FeedEvent>) -> Result<()> {
        self.run_until(feed, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Run the loop until `shutdown` resolves, then cancel retries and flush the tree.
    pub async fn run_until<F>(
        &mut self,
        mut feed: mpsc::UnboundedReceiver<FeedEvent>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut reports = self
            .reports
            .take()
            .ok_or_else(|| anyhow!("bridge loop already ran"))?;

        let sync = self.config.sync.clone();
        info!(
            "Bridge running: sweep every {:?}, topics '{}', {} chat(s)",
            sync.poll_interval(),
            self.topic.as_str(),
            self.config.chats.len()
        );

        let startup = tokio::time::sleep(sync.startup_delay());
        tokio::pin!(startup);
        let mut started = false;

        let first_poll = Instant::now() + sync.startup_delay() + sync.poll_interval();
        let mut poll = tokio::time::interval_at(first_poll, sync.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut flush_tick = tokio::time::interval(sync.flush_interval());
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        let mut feed_open = true;

        loop {
            tokio::select! {
                _ = &mut startup, if !started => {
                    started = true;
                    self.start_sweep();
                }
                _ = poll.tick() => {
                    self.start_sweep();
                }
                Some(report) = reports.recv() => {
                    self.handle_report(report);
                }
                event = feed.recv(), if feed_open => {
                    match event {
                        Some(event) => self.handle_feed_event(event),
                        None => {
                            debug!("Feed closed; timer-driven sync continues");
                            feed_open = false;
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    if let Err(e) = self.flush() {
                        warn!("State snapshot not written: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        self.reports = Some(reports);
        self.shutdown()
    }

    /// Start a node sweep unless one (or its retries) is still running.
    pub fn start_sweep(&mut self) -> bool {
        if self.executor.sweep_in_flight() {
            debug!("Previous node sweep still running; skipping");
            return false;
        }
        self.executor.invoke(CliAction::ListNodes, Completion::Sweep);
        true
    }

    pub fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Publish { topic, payload } => {
                if !self.topic.matches(&topic) {
                    trace!("Topic {} not subscribed", escape_log(&topic));
                    return;
                }
                match ingest(
                    &mut self.store,
                    &self.paths,
                    self.config.sync.history_max,
                    &payload,
                ) {
                    Ok(outcome) => {
                        trace!("Ingested {:?}", outcome);
                        metrics::inc_messages_ingested();
                    }
                    Err(e) => {
                        warn!("Dropping packet on {}: {}", escape_log(&topic), e);
                        metrics::inc_messages_dropped();
                    }
                }
            }
            FeedEvent::HostWrite { path, value } => {
                if let Err(e) = self.store.set_state(&path, value, false) {
                    warn!("Host write rejected: {}", e);
                    return;
                }
                self.dispatch_host_writes();
            }
        }
    }

    /// Turn queued unacknowledged writes into CLI actions. Returns how many were started.
    pub fn dispatch_host_writes(&mut self) -> usize {
        let mut started = 0;
        for event in self.store.drain_writes() {
            match translate(&self.paths, &event) {
                Some(cmd) => {
                    info!("{} requested via {}", cmd.action.label(), cmd.trigger);
                    self.executor.invoke(
                        cmd.action,
                        Completion::ClearTrigger {
                            path: cmd.trigger,
                            reset: cmd.reset,
                        },
                    );
                    started += 1;
                }
                None => debug!("Write to {} triggers nothing", event.path),
            }
        }
        started
    }

    pub fn handle_report(&mut self, report: AttemptReport) {
        if let Some(done) = self.executor.on_report(report) {
            self.handle_completed(done);
        }
    }

    pub fn handle_completed(&mut self, done: Completed) {
        let label = done.action.label();
        match (done.completion, done.outcome) {
            (Completion::Sweep, Ok(output)) => {
                let report = reconcile(&mut self.store, &self.paths, parse_nodes(&output));
                metrics::inc_sweeps_ok();
                metrics::add_nodes_created(report.created as u64);
                metrics::add_nodes_updated(report.updated as u64);
                metrics::add_records_discarded(report.discarded as u64);
                info!(
                    "Node sweep: {} new, {} updated, {} discarded",
                    report.created, report.updated, report.discarded
                );
                self.record_stats();
            }
            (Completion::Sweep, Err(e)) => {
                metrics::inc_sweeps_failed();
                error!("Node sweep failed: {}", e);
                self.record_stats();
            }
            (Completion::ClearTrigger { path, reset }, Ok(_)) => {
                if let Err(e) = self.store.set_state(&path, reset, true) {
                    warn!("Could not reset {}: {}", path, e);
                }
                info!("{} done", label);
            }
            (Completion::ClearTrigger { path, .. }, Err(e)) => {
                warn!("{} failed, {} left set: {}", label, path, e);
            }
            (Completion::Detached, Ok(_)) => debug!("{} done", label),
            (Completion::Detached, Err(e)) => warn!("{} failed: {}", label, e),
        }
    }

    fn record_stats(&mut self) {
        let snapshot = metrics::snapshot();
        debug!("metrics: {:?}", snapshot);
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self
                    .store
                    .set_state(&self.paths.stats(), Value::String(json), true)
                {
                    debug!("Counters not stored: {}", e);
                }
            }
            Err(e) => debug!("Counters not serialised: {}", e),
        }
    }

    /// Persist the tree if anything changed since the last flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.store.is_dirty() {
            return Ok(());
        }
        self.store.save(&self.state_file)?;
        self.store.mark_clean();
        trace!("State snapshot written to {}", self.state_file.display());
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down bridge...");
        self.executor.cancel();
        if self.executor.in_flight() > 0 {
            info!("Abandoning {} pending action(s)", self.executor.in_flight());
        }
        self.flush()?;
        info!("State saved to {}", self.state_file.display());
        Ok(())
    }

    /// Print a summary of the persisted tree.
    pub fn show_status(&self) {
        println!("=== meshbridge status ===");
        println!("State file: {}", self.state_file.display());
        match self.config.device.target() {
            Ok(target) => println!("Radio: {:?}", target),
            Err(e) => println!("Radio: {}", e),
        }

        let nodes = self.store.children(&self.paths.nodes());
        println!("Nodes: {}", nodes.len());
        for node in nodes {
            let field = |name: &str| {
                self.store
                    .get_state(&format!("{}.{}.info.{}", self.paths.nodes(), node, name))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        Value::Null => "-".to_string(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "-".to_string())
            };
            println!(
                "  {}  {:<20} battery={} last={}",
                node,
                field("user"),
                field("battery"),
                field("lastHeard")
            );
        }

        println!("Chats:");
        for chat in &self.config.chats {
            let last = self
                .store
                .get_str(&self.paths.chat_field(chat.index, "lastMessage"))
                .unwrap_or("-");
            println!("  [{}] {}: {}", chat.index, chat.name, last);
        }

        if let Some(stats) = self.store.get_str(&self.paths.stats()) {
            println!("Counters at last sweep: {}", stats);
        }
    }
}
