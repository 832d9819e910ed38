//! Scheduler statistics
//!
//! The scheduler exposes raw counters through [`StatisticsSource`];
//! [`current_stats`] projects them into a [`StatsSnapshot`] that is safe to
//! serialize. The projection is read-only and has no side effects.

use scopewatch_common::StatsView;

/// Raw counters as the scheduler reports them
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub tasks_living: usize,
    pub tasks_runnable: usize,
    /// `f64::INFINITY` when nothing waits on a deadline
    pub seconds_to_next_deadline: f64,
    pub run_sync_soon_queue_size: usize,
    pub io_backend: String,
}

/// Anything that can report scheduler counters on demand
///
/// Implemented by the scheduler (or a handle to it); must be cheap and must
/// not block on the scheduler making progress.
pub trait StatisticsSource: Send + Sync {
    fn statistics(&self) -> RunStatistics;
}

/// Reporting snapshot (derived, never stored)
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub live_task_count: usize,
    pub runnable_task_count: usize,
    /// `None` when no task awaits a timed wake-up
    pub seconds_to_next_deadline: Option<f64>,
    pub pending_callback_queue_depth: usize,
    pub io_backend_name: String,
}

/// Read the source once and project it
pub fn current_stats(source: &dyn StatisticsSource) -> StatsSnapshot {
    let raw = source.statistics();
    StatsSnapshot {
        live_task_count: raw.tasks_living,
        runnable_task_count: raw.tasks_runnable,
        seconds_to_next_deadline: deadline_seconds(raw.seconds_to_next_deadline),
        pending_callback_queue_depth: raw.run_sync_soon_queue_size,
        io_backend_name: raw.io_backend,
    }
}

/// Map the scheduler's "no deadline" sentinel to `None`
///
/// Non-finite values (infinity, NaN) never reach the JSON; overdue
/// deadlines report as zero.
fn deadline_seconds(raw: f64) -> Option<f64> {
    if raw.is_finite() {
        Some(raw.max(0.0))
    } else {
        None
    }
}

impl From<StatsSnapshot> for StatsView {
    fn from(stats: StatsSnapshot) -> Self {
        StatsView {
            tasks_living: stats.live_task_count,
            tasks_runnable: stats.runnable_task_count,
            seconds_to_next_deadline: stats.seconds_to_next_deadline,
            run_sync_soon_queue_size: stats.pending_callback_queue_depth,
            io_statistics_backend: stats.io_backend_name,
        }
    }
}
