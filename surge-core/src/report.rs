use serde::Serialize;
use surge_metrics::MetricsSnapshot;

use crate::config::RunConfig;
use crate::run::SchedulerReport;
use crate::thresholds::ThresholdRule;
use crate::thresholds_eval::{ThresholdReport, evaluate};

/// Run parameters as they appear in a report. Durations use humantime notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub target: String,
    pub vus: u64,
    pub duration: String,
    pub pause: String,
    pub request_timeout: String,
    pub latency_ceiling: String,
    pub graceful_stop: String,
}

impl From<&RunConfig> for ConfigSummary {
    fn from(cfg: &RunConfig) -> Self {
        let fmt = |d| humantime::format_duration(d).to_string();
        Self {
            target: cfg.target.url(),
            vus: cfg.vus,
            duration: fmt(cfg.duration),
            pause: cfg.pause.to_string(),
            request_timeout: fmt(cfg.request_timeout),
            latency_ceiling: fmt(cfg.latency_ceiling),
            graceful_stop: fmt(cfg.graceful_stop),
        }
    }
}

/// Everything a finished run produced. Rendering is left to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config: ConfigSummary,
    pub scheduler: SchedulerReport,
    pub metrics: MetricsSnapshot,
    pub thresholds: ThresholdReport,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.thresholds.passed
    }

    /// Evaluates a different rule set against the stored metrics.
    #[must_use]
    pub fn reevaluate(&self, rules: &[ThresholdRule]) -> ThresholdReport {
        evaluate(&self.metrics, rules)
    }
}
