//! Process-wide sync counters.
//! Read with [`snapshot`]; logged after each sweep and printed by `meshbridge status`.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static SWEEPS_OK: AtomicU64 = AtomicU64::new(0);
static SWEEPS_FAILED: AtomicU64 = AtomicU64::new(0);
static NODES_CREATED: AtomicU64 = AtomicU64::new(0);
static NODES_UPDATED: AtomicU64 = AtomicU64::new(0);
static RECORDS_DISCARDED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_INGESTED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_DROPPED: AtomicU64 = AtomicU64::new(0);
static RETRIES_SCHEDULED: AtomicU64 = AtomicU64::new(0);
static ACTIONS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static ACTIONS_EXHAUSTED: AtomicU64 = AtomicU64::new(0);

pub fn inc_sweeps_ok() {
    SWEEPS_OK.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sweeps_failed() {
    SWEEPS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_nodes_created(n: u64) {
    NODES_CREATED.fetch_add(n, Ordering::Relaxed);
}
pub fn add_nodes_updated(n: u64) {
    NODES_UPDATED.fetch_add(n, Ordering::Relaxed);
}
pub fn add_records_discarded(n: u64) {
    RECORDS_DISCARDED.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_messages_ingested() {
    MESSAGES_INGESTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_dropped() {
    MESSAGES_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_retries_scheduled() {
    RETRIES_SCHEDULED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_actions_succeeded() {
    ACTIONS_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_actions_exhausted() {
    ACTIONS_EXHAUSTED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub sweeps_ok: u64,
    pub sweeps_failed: u64,
    pub nodes_created: u64,
    pub nodes_updated: u64,
    pub records_discarded: u64,
    pub messages_ingested: u64,
    pub messages_dropped: u64,
    pub retries_scheduled: u64,
    pub actions_succeeded: u64,
    pub actions_exhausted: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sweeps_ok: SWEEPS_OK.load(Ordering::Relaxed),
        sweeps_failed: SWEEPS_FAILED.load(Ordering::Relaxed),
        nodes_created: NODES_CREATED.load(Ordering::Relaxed),
        nodes_updated: NODES_UPDATED.load(Ordering::Relaxed),
        records_discarded: RECORDS_DISCARDED.load(Ordering::Relaxed),
        messages_ingested: MESSAGES_INGESTED.load(Ordering::Relaxed),
        messages_dropped: MESSAGES_DROPPED.load(Ordering::Relaxed),
        retries_scheduled: RETRIES_SCHEDULED.load(Ordering::Relaxed),
        actions_succeeded: ACTIONS_SUCCEEDED.load(Ordering::Relaxed),
        actions_exhausted: ACTIONS_EXHAUSTED.load(Ordering::Relaxed),
    }
}
