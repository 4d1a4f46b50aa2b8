//! Runtime metrics and tick-budget instrumentation.
//!
//! Counters are plain `AtomicU64`s bumped from the hot path and read on
//! export; the coordinator owns them behind an `Arc` so a host can scrape
//! them from another thread. Step timings go through [`TickBudgetMonitor`],
//! a small ring buffer behind a `parking_lot::Mutex`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Lock-free counters for engine activity since startup.
#[derive(Debug, Default)]
pub struct ProgressionCounters {
    /// Events routed to a registry.
    pub events_processed: AtomicU64,
    /// Events dropped as malformed.
    pub events_rejected: AtomicU64,
    /// Level-up notices produced.
    pub level_ups: AtomicU64,
    /// Stat modifiers applied (events and skill effects).
    pub modifiers_applied: AtomicU64,
    /// Stat modifiers removed by expiry.
    pub modifiers_expired: AtomicU64,
    /// Reputation events recorded.
    pub reputation_events_added: AtomicU64,
    /// Reputation events removed after fully decaying.
    pub reputation_events_expired: AtomicU64,
    /// Coordinator ticks.
    pub ticks: AtomicU64,
    /// Save documents written.
    pub saves_completed: AtomicU64,
}

impl ProgressionCounters {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a counter.
    pub fn bump(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            events_processed: read(&self.events_processed),
            events_rejected: read(&self.events_rejected),
            level_ups: read(&self.level_ups),
            modifiers_applied: read(&self.modifiers_applied),
            modifiers_expired: read(&self.modifiers_expired),
            reputation_events_added: read(&self.reputation_events_added),
            reputation_events_expired: read(&self.reputation_events_expired),
            ticks: read(&self.ticks),
            saves_completed: read(&self.saves_completed),
        }
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Events routed to a registry.
    pub events_processed: u64,
    /// Events dropped as malformed.
    pub events_rejected: u64,
    /// Level-up notices produced.
    pub level_ups: u64,
    /// Modifiers applied.
    pub modifiers_applied: u64,
    /// Modifiers expired.
    pub modifiers_expired: u64,
    /// Reputation events recorded.
    pub reputation_events_added: u64,
    /// Reputation events faded out.
    pub reputation_events_expired: u64,
    /// Coordinator ticks.
    pub ticks: u64,
    /// Save documents written.
    pub saves_completed: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("events_processed", "Events routed to a registry", self.events_processed),
            ("events_rejected", "Malformed events dropped", self.events_rejected),
            ("level_ups", "Skill level-up notices", self.level_ups),
            ("modifiers_applied", "Stat modifiers applied", self.modifiers_applied),
            ("modifiers_expired", "Stat modifiers expired", self.modifiers_expired),
            ("reputation_events_added", "Reputation events recorded", self.reputation_events_added),
            ("reputation_events_expired", "Reputation events faded out", self.reputation_events_expired),
            ("ticks", "Coordinator ticks", self.ticks),
            ("saves_completed", "Save documents written", self.saves_completed),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            let _ = write!(
                out,
                "# HELP ascent_{name}_total {help}\n\
                 # TYPE ascent_{name}_total counter\n\
                 ascent_{name}_total {value}\n"
            );
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tick budget
// ---------------------------------------------------------------------------

const HISTORY_LEN: usize = 256;

/// Tracks wall time spent per host step against a soft budget.
///
/// ```rust
/// # use ascent_core::metrics::TickBudgetMonitor;
/// let monitor = TickBudgetMonitor::new(1.0);
/// {
///     let _guard = monitor.begin_step();
///     // drain events, tick
/// }
/// assert_eq!(monitor.step_count(), 1);
/// ```
#[derive(Debug)]
pub struct TickBudgetMonitor {
    budget_ms: f64,
    history: Mutex<StepHistory>,
}

#[derive(Debug)]
struct StepHistory {
    timings: Vec<f64>,
    next: usize,
    count: u64,
    last_over_budget: bool,
}

impl TickBudgetMonitor {
    /// Monitor with the given budget in milliseconds.
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(StepHistory {
                timings: vec![0.0; HISTORY_LEN],
                next: 0,
                count: 0,
                last_over_budget: false,
            }),
        }
    }

    /// Start timing a step; the guard records elapsed time on drop.
    #[must_use]
    pub fn begin_step(&self) -> StepGuard<'_> {
        StepGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a step timing in milliseconds.
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let slot = h.next;
        h.timings[slot] = ms;
        h.next = (slot + 1) % HISTORY_LEN;
        h.count += 1;
        h.last_over_budget = ms > self.budget_ms;
    }

    /// Most recent timing, 0 before any step.
    #[must_use]
    pub fn last_step_ms(&self) -> f64 {
        let h = self.history.lock();
        if h.count == 0 {
            return 0.0;
        }
        h.timings[(h.next + HISTORY_LEN - 1) % HISTORY_LEN]
    }

    /// Whether the most recent step exceeded the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.history.lock().last_over_budget
    }

    /// Steps recorded since creation.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.history.lock().count
    }

    /// The configured budget in milliseconds.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }

    /// Percentiles over the retained history.
    #[must_use]
    pub fn percentiles(&self) -> StepPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(HISTORY_LEN);
        if n == 0 {
            return StepPercentiles::default();
        }
        let mut sorted = h.timings[..n].to_vec();
        drop(h);
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        let over = sorted.iter().filter(|&&t| t > self.budget_ms).count();
        StepPercentiles {
            p50: at(0.5),
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[n - 1],
            over_budget_ratio: over as f64 / n as f64,
        }
    }
}

/// Records elapsed time into its monitor when dropped.
#[derive(Debug)]
pub struct StepGuard<'a> {
    monitor: &'a TickBudgetMonitor,
    start: Instant,
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Step timing distribution in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Slowest retained step.
    pub max: f64,
    /// Fraction of retained steps over budget (0.0 to 1.0).
    pub over_budget_ratio: f64,
}

impl StepPercentiles {
    /// One-line human-readable summary.
    #[must_use]
    pub fn summary(&self, budget_ms: f64) -> String {
        format!(
            "P50={:.3}ms P95={:.3}ms P99={:.3}ms Max={:.3}ms Budget={budget_ms:.1}ms Over={:.1}%",
            self.p50,
            self.p95,
            self.p99,
            self.max,
            self.over_budget_ratio * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::info_span!`.
pub mod spans {
    /// One host step (drain, tick, autosave).
    pub const STEP: &str = "ascent::step";
    /// Coordinator event dispatch.
    pub const PROCESS_EVENT: &str = "ascent::event";
    /// Coordinator tick.
    pub const TICK: &str = "ascent::tick";
    /// Save document generation and write.
    pub const PERSIST_SAVE: &str = "ascent::persist::save";
    /// Save load and restore.
    pub const PERSIST_LOAD: &str = "ascent::persist::load";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(ProgressionCounters::new().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let c = ProgressionCounters::new();
        ProgressionCounters::bump(&c.events_processed);
        ProgressionCounters::bump(&c.events_processed);
        ProgressionCounters::add(&c.modifiers_expired, 4);
        let snap = c.snapshot();
        assert_eq!(snap.events_processed, 2);
        assert_eq!(snap.modifiers_expired, 4);
        assert_eq!(snap.level_ups, 0);
    }

    #[test]
    fn prometheus_export() {
        let c = ProgressionCounters::new();
        ProgressionCounters::add(&c.level_ups, 7);
        let text = c.snapshot().to_prometheus();
        assert!(text.contains("ascent_level_ups_total 7"));
        assert!(text.contains("# TYPE ascent_ticks_total counter"));
        assert!(text.contains("# HELP ascent_saves_completed_total"));
    }

    #[test]
    fn monitor_records_steps() {
        let monitor = TickBudgetMonitor::new(1.0);
        assert!(monitor.last_step_ms().abs() < f64::EPSILON);
        monitor.record(0.2);
        monitor.record(0.4);
        assert_eq!(monitor.step_count(), 2);
        assert!((monitor.last_step_ms() - 0.4).abs() < 1e-9);
        assert!(!monitor.is_over_budget());
        monitor.record(1.5);
        assert!(monitor.is_over_budget());
    }

    #[test]
    fn monitor_wraps_history() {
        let monitor = TickBudgetMonitor::new(1.0);
        for i in 0..(HISTORY_LEN + 10) {
            monitor.record(i as f64);
        }
        assert!((monitor.last_step_ms() - (HISTORY_LEN + 9) as f64).abs() < 1e-9);
        let pct = monitor.percentiles();
        assert!((pct.max - (HISTORY_LEN + 9) as f64).abs() < 1e-9);
    }

    #[test]
    fn guard_records_on_drop() {
        let monitor = TickBudgetMonitor::new(100.0);
        {
            let _guard = monitor.begin_step();
        }
        assert_eq!(monitor.step_count(), 1);
        assert!(monitor.last_step_ms() < 100.0);
    }

    #[test]
    fn percentiles_are_ordered() {
        let monitor = TickBudgetMonitor::new(1.0);
        for i in 0..100 {
            monitor.record(f64::from(i) * 0.02);
        }
        let pct = monitor.percentiles();
        assert!(pct.p50 <= pct.p95 && pct.p95 <= pct.p99 && pct.p99 <= pct.max);
        assert!(pct.over_budget_ratio > 0.4 && pct.over_budget_ratio < 0.6);
        assert!(pct.summary(1.0).contains("Budget=1.0ms"));
    }

    #[test]
    fn empty_monitor_percentiles() {
        assert_eq!(TickBudgetMonitor::new(1.0).percentiles(), StepPercentiles::default());
    }
}
