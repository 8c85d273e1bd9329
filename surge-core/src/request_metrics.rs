use surge_metrics::{MetricId, MetricKind, Registry, TagSet};

use crate::executor::{OutcomeClass, RequestOutcome};

/// `name` tag carried by every request series.
pub const REQUEST_NAME: &str = "SpikeTest";

#[derive(Debug, Clone, Copy)]
pub struct RequestMetricIds {
    /// Requests attempted, tagged by `name` and `status` (`0` when no response arrived).
    pub http_reqs: MetricId,
    pub http_req_failed: MetricId,
    /// Tagged by `name`.
    pub http_req_duration: MetricId,
    /// Transport failures, tagged by `error_kind`.
    pub http_req_errors: MetricId,
}

impl RequestMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            http_reqs: metrics.register("http_reqs", MetricKind::Counter),
            http_req_failed: metrics.register("http_req_failed", MetricKind::Rate),
            http_req_duration: metrics.register_time_trend("http_req_duration"),
            http_req_errors: metrics.register("http_req_errors", MetricKind::Counter),
        }
    }

    pub fn record_outcome(&self, metrics: &Registry, outcome: &RequestOutcome) {
        let untagged = TagSet::default();

        let status = outcome.status.unwrap_or(0).to_string();
        let tags = metrics.resolve_tags(&[("name", REQUEST_NAME), ("status", status.as_str())]);
        metrics.increment_counter(self.http_reqs, &tags);
        let named = metrics.resolve_tags(&[("name", REQUEST_NAME)]);

        metrics.record_rate(
            self.http_req_failed,
            &untagged,
            outcome.class == OutcomeClass::UnexpectedFailure,
        );
        metrics.record_duration(self.http_req_duration, &named, outcome.latency);

        if let Some(kind) = outcome.error_kind {
            let kind = kind.to_string();
            let tags = metrics.resolve_tags(&[("error_kind", kind.as_str())]);
            metrics.increment_counter(self.http_req_errors, &tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use surge_http::HttpTransportErrorKind;
    use surge_metrics::SeriesValue;

    use super::*;

    #[test]
    fn records_status_and_error_series() {
        let metrics = Registry::default();
        let ids = RequestMetricIds::register(&metrics);

        ids.record_outcome(
            &metrics,
            &RequestOutcome {
                class: OutcomeClass::Success,
                latency: Duration::from_millis(20),
                status: Some(201),
                error_kind: None,
                slow: false,
            },
        );
        ids.record_outcome(
            &metrics,
            &RequestOutcome {
                class: OutcomeClass::UnexpectedFailure,
                latency: Duration::from_millis(10),
                status: None,
                error_kind: Some(HttpTransportErrorKind::Connect),
                slow: false,
            },
        );

        let snap = metrics.snapshot(Duration::from_secs(1));
        assert_eq!(snap.counter("http_reqs"), Some(2));
        assert_eq!(snap.counter("http_req_errors"), Some(1));
        assert_eq!(snap.rate("http_req_failed").map(|r| r.rate), Some(Some(0.5)));
        assert_eq!(snap.trend("http_req_duration").map(|t| t.count()), Some(2));

        let by_status: Vec<_> = snap
            .series_by_tag("http_reqs", "status")
            .map(|(status, v)| (status.to_string(), matches!(v, SeriesValue::Counter(1))))
            .collect();
        assert_eq!(
            by_status,
            [("0".to_string(), true), ("201".to_string(), true)]
        );

        let names: Vec<_> = snap
            .series_by_tag("http_reqs", "name")
            .chain(snap.series_by_tag("http_req_duration", "name"))
            .map(|(name, _)| name.to_string())
            .collect();
        assert_eq!(names, [REQUEST_NAME; 3]);

        let kinds: Vec<_> = snap
            .series_by_tag("http_req_errors", "error_kind")
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(kinds, ["connect"]);
    }
}
