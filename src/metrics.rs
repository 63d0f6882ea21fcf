//! Prometheus metrics for the bridge core.
//!
//! Gathered by the /metrics endpoint of the status API.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Gauge,
};

lazy_static! {
    // Ledger activity
    pub static ref DEPOSITS_CREDITED: Counter = register_counter!(
        "bridge_deposits_credited_total",
        "Total number of BAN deposits credited to the ledger"
    ).unwrap();

    pub static ref WITHDRAWALS: CounterVec = register_counter_vec!(
        "bridge_withdrawals_total",
        "Total number of withdrawal requests by outcome",
        &["status"]
    ).unwrap();

    pub static ref SWAPS: CounterVec = register_counter_vec!(
        "bridge_swaps_total",
        "Total number of swaps by direction",
        &["direction"]
    ).unwrap();

    pub static ref DUPLICATE_EVENTS: Counter = register_counter!(
        "bridge_duplicate_events_total",
        "Chain events skipped because they were already credited"
    ).unwrap();

    // Queue health
    pub static ref JOBS: CounterVec = register_counter_vec!(
        "bridge_jobs_total",
        "Queue jobs by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();

    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "bridge_queue_depth",
        "Jobs waiting across all accounts"
    ).unwrap();

    pub static ref DEAD_LETTER: Gauge = register_gauge!(
        "bridge_dead_letter_jobs",
        "Jobs parked for operator inspection"
    ).unwrap();

    pub static ref PENDING_WITHDRAWALS: Gauge = register_gauge!(
        "bridge_pending_withdrawals_ban",
        "Summed amount of withdrawals waiting on hot-wallet funds, in BAN"
    ).unwrap();

    // Scanner
    pub static ref LAST_PROCESSED_BLOCK: Gauge = register_gauge!(
        "bridge_last_processed_block",
        "Highest fully-processed EVM block"
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "bridge_up",
        "Whether the bridge is up and running"
    ).unwrap();
}

pub fn record_deposit() {
    DEPOSITS_CREDITED.inc();
}

pub fn record_withdrawal(status: &str) {
    WITHDRAWALS.with_label_values(&[status]).inc();
}

pub fn record_swap(direction: &str) {
    SWAPS.with_label_values(&[direction]).inc();
}

pub fn record_duplicate_event() {
    DUPLICATE_EVENTS.inc();
}

pub fn record_job(kind: &str, outcome: &str) {
    JOBS.with_label_values(&[kind, outcome]).inc();
}

pub fn set_queue_depth(depth: u64) {
    QUEUE_DEPTH.set(depth as f64);
}

pub fn set_dead_letter_count(count: u64) {
    DEAD_LETTER.set(count as f64);
}

pub fn set_pending_withdrawals(ban: f64) {
    PENDING_WITHDRAWALS.set(ban);
}

pub fn set_last_processed_block(block: u64) {
    LAST_PROCESSED_BLOCK.set(block as f64);
}
