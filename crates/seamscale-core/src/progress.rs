// crates/seamscale-core/src/progress.rs
//
// Progress reporting. The executor calls the sink once per completed work
// item, success or failure, with a monotonically increasing completed count.
// Sinks are advisory: they must return quickly and must tolerate being a
// no-op when progress output is disabled.

use std::time::Duration;

use tracing::info;

/// Snapshot passed to a `ProgressSink` after each completion.
#[derive(Clone, Debug)]
pub struct ProgressUpdate {
    pub completed: usize,
    pub total:     usize,
    pub elapsed:   Duration,
    pub label:     String,
    pub success:   bool,
    /// Completions required before `eta()` returns anything.
    pub eta_min_samples: usize,
    /// Elapsed time required before `eta()` returns anything.
    pub eta_min_elapsed: Duration,
}

impl ProgressUpdate {
    /// Estimated time remaining, extrapolated from the mean time per completed
    /// item. `None` until enough samples and enough wall time have accumulated,
    /// or when the total is unknown (zero).
    ///
    /// ```
    /// use std::time::Duration;
    /// use seamscale_core::progress::ProgressUpdate;
    /// let u = ProgressUpdate {
    ///     completed: 4, total: 10, elapsed: Duration::from_secs(8),
    ///     label: "frame 3".into(), success: true,
    ///     eta_min_samples: 3, eta_min_elapsed: Duration::from_secs(1),
    /// };
    /// assert_eq!(u.eta(), Some(Duration::from_secs(12)));
    /// ```
    pub fn eta(&self) -> Option<Duration> {
        if self.total == 0
            || self.completed < self.eta_min_samples.max(1)
            || self.elapsed < self.eta_min_elapsed
        {
            return None;
        }
        let remaining = self.total.saturating_sub(self.completed) as f64;
        let per_item  = self.elapsed.as_secs_f64() / self.completed as f64;
        Some(Duration::from_secs_f64(per_item * remaining))
    }

    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 { 0.0 } else { (self.completed as f64 / self.total as f64).min(1.0) }
    }
}

pub trait ProgressSink: Sync {
    fn on_item_complete(&self, update: &ProgressUpdate);
}

/// Progress disabled.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_item_complete(&self, _update: &ProgressUpdate) {}
}

/// Logs every `every`-th completion (and the last one) at info level.
pub struct LogProgress {
    pub what:  &'static str,
    pub every: usize,
}

impl LogProgress {
    pub fn new(what: &'static str, every: usize) -> Self {
        Self { what, every: every.max(1) }
    }
}

impl ProgressSink for LogProgress {
    fn on_item_complete(&self, u: &ProgressUpdate) {
        if u.completed % self.every != 0 && u.completed != u.total {
            return;
        }
        match u.eta() {
            Some(eta) => info!(
                "{} {}/{} ({:.0}%) last={} ok={} eta={:.1}s",
                self.what, u.completed, u.total, u.fraction() * 100.0,
                u.label, u.success, eta.as_secs_f64(),
            ),
            None => info!(
                "{} {}/{} last={} ok={}",
                self.what, u.completed, u.total, u.label, u.success,
            ),
        }
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate) + Sync,
{
    fn on_item_complete(&self, update: &ProgressUpdate) {
        self(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(completed: usize, secs: u64) -> ProgressUpdate {
        ProgressUpdate {
            completed,
            total:   10,
            elapsed: Duration::from_secs(secs),
            label:   String::new(),
            success: true,
            eta_min_samples: 3,
            eta_min_elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn eta_waits_for_enough_samples() {
        assert_eq!(update(2, 10).eta(), None);
        assert!(update(3, 10).eta().is_some());
    }

    #[test]
    fn eta_waits_for_elapsed_threshold() {
        let mut u = update(5, 0);
        u.elapsed = Duration::from_millis(500);
        assert_eq!(u.eta(), None);
    }

    #[test]
    fn eta_is_zero_when_done() {
        assert_eq!(update(10, 20).eta(), Some(Duration::ZERO));
    }
}
