//! Shared health state for the /health endpoint.
//! Updated by the ingestion pipeline and the forecast dispatcher.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Shared health metrics. Components update, the API reads.
#[derive(Default)]
pub struct HealthState {
    /// True once the pool is open and the schema is installed.
    pub db_ready: AtomicBool,
    /// Millisecond UTC epoch of the last successful telemetry insert (0 = none).
    pub last_insert_at_ms: AtomicI64,
    /// Triggers accepted onto the forecast queue.
    pub triggers_enqueued: AtomicU64,
    /// Triggers rejected because the queue was full.
    pub triggers_rejected: AtomicU64,
    /// Forecast invocations that persisted a batch.
    pub forecasts_completed: AtomicU64,
    /// Forecast invocations that failed (budget, model plumbing, database).
    pub forecasts_failed: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_db_ready(&self, v: bool) {
        self.db_ready.store(v, Ordering::Relaxed);
    }

    pub fn set_last_insert_at_ms(&self, ms: i64) {
        self.last_insert_at_ms.store(ms, Ordering::Relaxed);
    }

    pub fn inc_triggers_enqueued(&self) {
        self.triggers_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers_rejected(&self) {
        self.triggers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forecasts_completed(&self) {
        self.forecasts_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forecasts_failed(&self) {
        self.forecasts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn db_ready(&self) -> bool {
        self.db_ready.load(Ordering::Relaxed)
    }

    pub fn last_insert_at_ms(&self) -> i64 {
        self.last_insert_at_ms.load(Ordering::Relaxed)
    }

    pub fn triggers_enqueued(&self) -> u64 {
        self.triggers_enqueued.load(Ordering::Relaxed)
    }

    pub fn triggers_rejected(&self) -> u64 {
        self.triggers_rejected.load(Ordering::Relaxed)
    }

    pub fn forecasts_completed(&self) -> u64 {
        self.forecasts_completed.load(Ordering::Relaxed)
    }

    pub fn forecasts_failed(&self) -> u64 {
        self.forecasts_failed.load(Ordering::Relaxed)
    }
}
