use std::sync::Arc;
use std::time::Duration;

use surge_metrics::MetricsSnapshot;

/// Live view of a run, emitted about once per second while VUs are active.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub tick: u64,
    /// Time since the previous update.
    pub interval: Duration,
    pub elapsed: Duration,
    pub duration: Duration,
    pub vus: u64,
    pub snapshot: MetricsSnapshot,
}

impl ProgressUpdate {
    /// Fraction of the planned duration that has elapsed, clamped to `[0, 1]`.
    #[must_use]
    pub fn completion(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
