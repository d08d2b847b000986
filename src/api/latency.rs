//! In-memory latency histograms for forecast instrumentation.
//! Records external model call time and whole-invocation time.

use std::sync::Mutex;
use std::time::Duration;

/// Shared latency stats. The forecast path records, the API reads.
/// Values stored in milliseconds.
pub struct LatencyStats {
    model_ms: Mutex<hdrhistogram::Histogram<u64>>,
    invocation_ms: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Tracks 1ms to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        Self {
            model_ms: Mutex::new(histogram()),
            invocation_ms: Mutex::new(histogram()),
        }
    }

    /// Record one external model HTTP call, successful or not.
    pub fn record_model_call(&self, d: Duration) {
        record(&self.model_ms, d);
    }

    /// Record one whole forecast invocation.
    pub fn record_invocation(&self, d: Duration) {
        record(&self.invocation_ms, d);
    }

    /// (count, p50_ms, p95_ms, p99_ms) for model calls.
    pub fn model_percentiles(&self) -> (u64, Option<u64>, Option<u64>, Option<u64>) {
        percentiles(&self.model_ms)
    }

    /// (count, p50_ms, p95_ms, p99_ms) for whole invocations.
    pub fn invocation_percentiles(&self) -> (u64, Option<u64>, Option<u64>, Option<u64>) {
        percentiles(&self.invocation_ms)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

fn histogram() -> hdrhistogram::Histogram<u64> {
    hdrhistogram::Histogram::new_with_bounds(1, 600_000, 3).expect("valid histogram bounds")
}

fn record(h: &Mutex<hdrhistogram::Histogram<u64>>, d: Duration) {
    if let Ok(mut h) = h.lock() {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        let _ = h.record(ms.max(1));
    }
}

fn percentiles(
    h: &Mutex<hdrhistogram::Histogram<u64>>,
) -> (u64, Option<u64>, Option<u64>, Option<u64>) {
    let Ok(h) = h.lock() else {
        return (0, None, None, None);
    };
    if h.len() == 0 {
        return (0, None, None, None);
    }
    (
        h.len(),
        Some(h.value_at_quantile(0.5)),
        Some(h.value_at_quantile(0.95)),
        Some(h.value_at_quantile(0.99)),
    )
}
