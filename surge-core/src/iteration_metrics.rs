use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry, TagSet};

#[derive(Debug, Clone, Copy)]
pub struct IterationMetricIds {
    pub iterations: MetricId,
    /// Iterations dropped mid-flight by cancellation.
    pub iterations_interrupted: MetricId,
    pub iteration_duration: MetricId,
}

impl IterationMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            iterations: metrics.register("iterations", MetricKind::Counter),
            iterations_interrupted: metrics.register("iterations_interrupted", MetricKind::Counter),
            iteration_duration: metrics.register_time_trend("iteration_duration"),
        }
    }

    pub fn record_iteration(&self, metrics: &Registry, duration: Duration) {
        let tags = TagSet::default();
        metrics.increment_counter(self.iterations, &tags);
        metrics.record_duration(self.iteration_duration, &tags, duration);
    }

    pub fn record_interrupted(&self, metrics: &Registry) {
        metrics.increment_counter(self.iterations_interrupted, &TagSet::default());
    }
}
