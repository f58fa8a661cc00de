//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid contending with the session lock.
//! Reporting is the only operation that resets anything (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Position ticks processed by the route player (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick latencies in microseconds (reset on report)
    tick_latency_sum_us: AtomicU64,
    /// Max tick latency in microseconds (reset on report)
    tick_latency_max_us: AtomicU64,
    /// Ticks discarded because their session had ended
    late_ticks_dropped: AtomicU64,
    /// Samples too old to trust for arrival decisions
    stale_samples: AtomicU64,
    sessions_started: AtomicU64,
    sessions_arrived: AtomicU64,
    sessions_stopped: AtomicU64,
    route_not_found: AtomicU64,
    no_locations_known: AtomicU64,
    store_failures: AtomicU64,
    /// Live driver attach failed and the synthetic driver took over
    driver_fallbacks: AtomicU64,
    instructions_announced: AtomicU64,
    instructions_suppressed: AtomicU64,
    speech_dropped: AtomicU64,
    position_fixes_received: AtomicU64,
    position_fixes_invalid: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_latency_sum_us: AtomicU64::new(0),
            tick_latency_max_us: AtomicU64::new(0),
            late_ticks_dropped: AtomicU64::new(0),
            stale_samples: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_arrived: AtomicU64::new(0),
            sessions_stopped: AtomicU64::new(0),
            route_not_found: AtomicU64::new(0),
            no_locations_known: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            driver_fallbacks: AtomicU64::new(0),
            instructions_announced: AtomicU64::new(0),
            instructions_suppressed: AtomicU64::new(0),
            speech_dropped: AtomicU64::new(0),
            position_fixes_received: AtomicU64::new(0),
            position_fixes_invalid: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_tick(&self, latency_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.tick_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_late_tick(&self) {
        self.late_ticks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_sample(&self) {
        self.stale_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_arrived(&self) {
        self.sessions_arrived.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_stopped(&self) {
        self.sessions_stopped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_not_found(&self) {
        self.route_not_found.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_no_locations_known(&self) {
        self.no_locations_known.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_driver_fallback(&self) {
        self.driver_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_instruction_announced(&self) {
        self.instructions_announced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_instruction_suppressed(&self) {
        self.instructions_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_speech_dropped(&self) {
        self.speech_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_fix(&self) {
        self.position_fixes_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_fix_invalid(&self) {
        self.position_fixes_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn late_ticks_dropped(&self) -> u64 {
        self.late_ticks_dropped.load(Ordering::Relaxed)
    }

    pub fn driver_fallbacks(&self) -> u64 {
        self.driver_fallbacks.load(Ordering::Relaxed)
    }

    pub fn instructions_announced(&self) -> u64 {
        self.instructions_announced.load(Ordering::Relaxed)
    }

    pub fn speech_dropped(&self) -> u64 {
        self.speech_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot monotonic counters and reset the periodic ones
    pub fn report(&self) -> MetricsSummary {
        let ticks = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.tick_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.tick_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            ticks as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_tick_latency_us = if ticks > 0 { latency_sum / ticks } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            avg_tick_latency_us,
            max_tick_latency_us: max_latency,
            late_ticks_dropped: self.late_ticks_dropped.load(Ordering::Relaxed),
            stale_samples: self.stale_samples.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_arrived: self.sessions_arrived.load(Ordering::Relaxed),
            sessions_stopped: self.sessions_stopped.load(Ordering::Relaxed),
            route_not_found: self.route_not_found.load(Ordering::Relaxed),
            no_locations_known: self.no_locations_known.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            driver_fallbacks: self.driver_fallbacks.load(Ordering::Relaxed),
            instructions_announced: self.instructions_announced.load(Ordering::Relaxed),
            instructions_suppressed: self.instructions_suppressed.load(Ordering::Relaxed),
            speech_dropped: self.speech_dropped.load(Ordering::Relaxed),
            position_fixes_received: self.position_fixes_received.load(Ordering::Relaxed),
            position_fixes_invalid: self.position_fixes_invalid.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    pub late_ticks_dropped: u64,
    pub stale_samples: u64,
    pub sessions_started: u64,
    pub sessions_arrived: u64,
    pub sessions_stopped: u64,
    pub route_not_found: u64,
    pub no_locations_known: u64,
    pub store_failures: u64,
    pub driver_fallbacks: u64,
    pub instructions_announced: u64,
    pub instructions_suppressed: u64,
    pub speech_dropped: u64,
    pub position_fixes_received: u64,
    pub position_fixes_invalid: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            avg_tick_latency_us = %self.avg_tick_latency_us,
            max_tick_latency_us = %self.max_tick_latency_us,
            sessions_started = %self.sessions_started,
            arrived = %self.sessions_arrived,
            stopped = %self.sessions_stopped,
            route_not_found = %self.route_not_found,
            driver_fallbacks = %self.driver_fallbacks,
            instructions = %self.instructions_announced,
            late_ticks = %self.late_ticks_dropped,
            stale_samples = %self.stale_samples,
            speech_dropped = %self.speech_dropped,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ticks_total(), 0);
        assert_eq!(metrics.late_ticks_dropped(), 0);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_tick(100);
        metrics.record_tick(300);

        let first = metrics.report();
        assert_eq!(first.ticks_total, 2);
        assert_eq!(first.avg_tick_latency_us, 200);
        assert_eq!(first.max_tick_latency_us, 300);

        let second = metrics.report();
        assert_eq!(second.ticks_total, 2);
        assert_eq!(second.avg_tick_latency_us, 0);
        assert_eq!(second.max_tick_latency_us, 0);
    }

    #[test]
    fn test_atomic_max() {
        let max = AtomicU64::new(5);
        update_atomic_max(&max, 3);
        assert_eq!(max.load(Ordering::Relaxed), 5);
        update_atomic_max(&max, 9);
        assert_eq!(max.load(Ordering::Relaxed), 9);
    }
}
