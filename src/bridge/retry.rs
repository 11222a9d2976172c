//! Bounded retry for CLI actions.
//!
//! Every [`RetryExecutor::invoke`] gets its own [`RetryState`]. Attempts run as spawned
//! tasks that only execute the CLI and send an [`AttemptReport`] back; the owning loop
//! feeds reports into [`RetryExecutor::on_report`], which either schedules the next
//! attempt after the fixed delay or hands back a [`Completed`] carrying the caller's
//! [`Completion`].
//!
//! With `max_retries = n` an action runs at most `n + 1` times. Delayed re-attempts check
//! the shared cancellation flag before running so shutdown never starts new CLI work.

use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::RetryConfig;
use crate::meshtastic::{check_connected, ActionError, ActionRunner, CliAction, DeviceTarget};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: cfg.delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// What the owner does once an invocation finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Parse the output as a node table and reconcile it.
    Sweep,
    /// Reset a trigger field to its idle value on success.
    ClearTrigger { path: String, reset: Value },
    /// Nothing beyond logging.
    Detached,
}

#[derive(Debug)]
pub struct RetryState {
    pub action: CliAction,
    pub completion: Completion,
    /// Failed attempts so far.
    pub attempt: u32,
}

/// Result of one attempt, sent from the attempt task to the owner.
#[derive(Debug)]
pub struct AttemptReport {
    pub id: u64,
    pub result: Result<String, ActionError>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: ActionError,
}

#[derive(Debug)]
pub struct Completed {
    pub action: CliAction,
    pub completion: Completion,
    pub outcome: Result<String, Exhausted>,
}

pub struct RetryExecutor {
    runner: Arc<dyn ActionRunner>,
    target: DeviceTarget,
    marker: String,
    policy: RetryPolicy,
    states: HashMap<u64, RetryState>,
    next_id: u64,
    reports: mpsc::UnboundedSender<AttemptReport>,
    cancelled: Arc<AtomicBool>,
}

impl RetryExecutor {
    pub fn new(
        runner: Arc<dyn ActionRunner>,
        target: DeviceTarget,
        marker: impl Into<String>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<AttemptReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = Self {
            runner,
            target,
            marker: marker.into(),
            policy,
            states: HashMap::new(),
            next_id: 1,
            reports: tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        (executor, rx)
    }

    /// Start an action; the first attempt runs immediately.
    pub fn invoke(&mut self, action: CliAction, completion: Completion) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        debug!("invoke #{} {}", id, action.label());
        self.spawn_attempt(id, &action, None);
        self.states.insert(
            id,
            RetryState {
                action,
                completion,
                attempt: 0,
            },
        );
        id
    }

    /// Advance the state machine with one attempt result.
    pub fn on_report(&mut self, report: AttemptReport) -> Option<Completed> {
        let Some(state) = self.states.get_mut(&report.id) else {
            debug!("Report for unknown invocation #{}", report.id);
            return None;
        };

        match report.result {
            Ok(output) => {
                let state = self.states.remove(&report.id)?;
                if state.attempt > 0 {
                    info!(
                        "{} succeeded after {} retries",
                        state.action.label(),
                        state.attempt
                    );
                }
                metrics::inc_actions_succeeded();
                Some(Completed {
                    action: state.action,
                    completion: state.completion,
                    outcome: Ok(output),
                })
            }
            Err(e) if self.cancelled.load(Ordering::SeqCst) => {
                debug!("{} failed during shutdown: {}", state.action.label(), e);
                self.states.remove(&report.id);
                None
            }
            Err(e) if state.attempt < self.policy.max_retries => {
                state.attempt += 1;
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    state.action.label(),
                    state.attempt,
                    self.policy.max_retries + 1,
                    e,
                    self.policy.delay
                );
                let action = state.action.clone();
                metrics::inc_retries_scheduled();
                self.spawn_attempt(report.id, &action, Some(self.policy.delay));
                None
            }
            Err(e) => {
                let state = self.states.remove(&report.id)?;
                let attempts = state.attempt + 1;
                error!(
                    "{} abandoned after {} attempts: {}",
                    state.action.label(),
                    attempts,
                    e
                );
                metrics::inc_actions_exhausted();
                Some(Completed {
                    action: state.action,
                    completion: state.completion,
                    outcome: Err(Exhausted {
                        attempts,
                        last_error: e,
                    }),
                })
            }
        }
    }

    /// True while a node sweep (first attempt or any retry) is outstanding.
    pub fn sweep_in_flight(&self) -> bool {
        self.states
            .values()
            .any(|s| matches!(s.completion, Completion::Sweep))
    }

    pub fn in_flight(&self) -> usize {
        self.states.len()
    }

    /// Stop scheduling work. Pending delayed attempts see the flag and never run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn spawn_attempt(&self, id: u64, action: &CliAction, delay: Option<Duration>) {
        let args = action.args(&self.target);
        let needs_marker = action.requires_connected_marker();
        let marker = self.marker.clone();
        let runner = Arc::clone(&self.runner);
        let reports = self.reports.clone();
        let cancelled = Arc::clone(&self.cancelled);

        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if cancelled.load(Ordering::SeqCst) {
                debug!("Attempt for #{} cancelled", id);
                return;
            }
            let result = runner.run(&args).await.and_then(|output| {
                if needs_marker {
                    check_connected(output, &marker)
                } else {
                    Ok(output)
                }
            });
            let _ = reports.send(AttemptReport { id, result });
        });
    }
}
