use serde::Serialize;
use surge_metrics::{MetricKind, MetricsSnapshot};

use crate::{ThresholdAgg, ThresholdRule};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub metric: String,
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `None` when the metric has no data for the aggregation; such a rule fails.
    pub observed: Option<f64>,
    pub bound: f64,
    pub passed: bool,
}

impl RuleResult {
    /// Label if the rule has one, otherwise the metric name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.metric)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdReport {
    pub passed: bool,
    pub results: Vec<RuleResult>,
}

impl ThresholdReport {
    pub fn violations(&self) -> impl Iterator<Item = &RuleResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Checks every rule against `snapshot`. Pure: the same snapshot always yields the same report.
#[must_use]
pub fn evaluate(snapshot: &MetricsSnapshot, rules: &[ThresholdRule]) -> ThresholdReport {
    let results: Vec<RuleResult> = rules
        .iter()
        .map(|rule| {
            let observed = observed_value(snapshot, rule);
            let passed = observed.is_some_and(|v| rule.expr.op.compare(v, rule.expr.value));
            RuleResult {
                metric: rule.metric.clone(),
                expression: rule.expression.clone(),
                label: rule.label.clone(),
                observed,
                bound: rule.expr.value,
                passed,
            }
        })
        .collect();

    ThresholdReport {
        passed: results.iter().all(|r| r.passed),
        results,
    }
}

fn observed_value(snapshot: &MetricsSnapshot, rule: &ThresholdRule) -> Option<f64> {
    let name = rule.metric.as_str();
    match rule.kind {
        MetricKind::Counter => {
            let count = snapshot.counter(name)?;
            match rule.expr.agg {
                ThresholdAgg::Count => Some(count as f64),
                // Per second over the run.
                ThresholdAgg::Rate => {
                    let secs = snapshot.elapsed.as_secs_f64();
                    (secs > 0.0).then(|| count as f64 / secs)
                }
                _ => None,
            }
        }
        MetricKind::Rate => {
            let rate = snapshot.rate(name)?;
            match rule.expr.agg {
                ThresholdAgg::Rate => rate.rate,
                ThresholdAgg::Count => Some(rate.total as f64),
                _ => None,
            }
        }
        MetricKind::Trend => {
            let trend = snapshot.trend(name)?;
            match rule.expr.agg {
                ThresholdAgg::Avg => trend.mean(),
                ThresholdAgg::Min => trend.min(),
                ThresholdAgg::Max => trend.max(),
                ThresholdAgg::Med => trend.percentile(50.0),
                ThresholdAgg::P(p) => trend.percentile(p),
                ThresholdAgg::Count => Some(trend.count() as f64),
                ThresholdAgg::Rate => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{ThresholdSet, compile_thresholds, default_spike_thresholds};
    use surge_metrics::{RateSnapshot, Registry, TrendSnapshot, ValueType};

    fn spike_rules() -> Vec<ThresholdRule> {
        let reg = Registry::default();
        reg.register("tickets_created", MetricKind::Counter);
        reg.register("ticket_errors", MetricKind::Rate);
        reg.register_time_trend("http_req_duration");
        compile_thresholds(&default_spike_thresholds(), &reg).unwrap_or_else(|e| panic!("{e}"))
    }

    /// 100 latency samples whose nearest-rank p95 is 2500ms.
    fn snapshot_with(tickets_created: u64) -> MetricsSnapshot {
        let mut snap = MetricsSnapshot {
            elapsed: Duration::from_secs(10),
            ..MetricsSnapshot::default()
        };
        let samples = (1..=100u64).map(|i| if i <= 95 { 2_500_000 } else { 4_000_000 });
        snap.trends.insert(
            "http_req_duration".to_string(),
            TrendSnapshot::from_samples(ValueType::Time, samples),
        );
        snap.rates
            .insert("ticket_errors".to_string(), RateSnapshot::new(100, 3));
        snap.counters
            .insert("tickets_created".to_string(), tickets_created);
        snap
    }

    #[test]
    fn spike_thresholds_pass_on_healthy_snapshot() {
        let report = evaluate(&snapshot_with(45), &spike_rules());
        assert!(report.passed);
        assert_eq!(report.violations().count(), 0);

        // Histogram buckets keep 3 significant digits.
        let p95 = report.results[0].observed.unwrap_or_else(|| panic!("no p95"));
        assert!((p95 - 2500.0).abs() <= 2.5, "p95={p95}");
        assert_eq!(report.results[1].observed, Some(0.03));
        assert_eq!(report.results[2].observed, Some(45.0));
    }

    #[test]
    fn low_ticket_count_flips_only_the_count_rule() {
        let report = evaluate(&snapshot_with(35), &spike_rules());
        assert!(!report.passed);

        let failed: Vec<_> = report.violations().map(|r| r.metric.as_str()).collect();
        assert_eq!(failed, ["tickets_created"]);
        assert_eq!(report.results[2].observed, Some(35.0));
        assert_eq!(report.results[2].bound, 40.0);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let snap = snapshot_with(35);
        let rules = spike_rules();
        assert_eq!(evaluate(&snap, &rules), evaluate(&snap, &rules));
    }

    #[test]
    fn empty_data_fails_the_rule() {
        let reg = Registry::default();
        reg.register("ticket_errors", MetricKind::Rate);
        reg.register_time_trend("http_req_duration");
        let rules = compile_thresholds(
            &[
                ThresholdSet::new("ticket_errors", ["rate<0.05"]),
                ThresholdSet::new("http_req_duration", ["p(95)<3000"]),
            ],
            &reg,
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let report = evaluate(&reg.snapshot(Duration::from_secs(1)), &rules);
        assert!(!report.passed);
        assert!(report.results.iter().all(|r| r.observed.is_none()));
    }

    #[test]
    fn counter_rate_is_per_second() {
        let reg = Registry::default();
        let id = reg.register("http_reqs", MetricKind::Counter);
        let tags = reg.resolve_tags(&[]);
        for _ in 0..50 {
            reg.increment_counter(id, &tags);
        }
        let rules = compile_thresholds(&[ThresholdSet::new("http_reqs", ["rate>=10"])], &reg)
            .unwrap_or_else(|e| panic!("{e}"));

        let report = evaluate(&reg.snapshot(Duration::from_secs(5)), &rules);
        assert_eq!(report.results[0].observed, Some(10.0));
        assert!(report.passed);
    }

    #[test]
    fn labelled_rule_reports_its_label() {
        let reg = Registry::default();
        reg.register("tickets_created", MetricKind::Counter);
        let rules = compile_thresholds(
            &[ThresholdSet::new("tickets_created", ["count>0"]).with_label("tickets")],
            &reg,
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let report = evaluate(&reg.snapshot(Duration::from_secs(1)), &rules);
        assert_eq!(report.results[0].display_name(), "tickets");
        assert_eq!(report.results[0].observed, Some(0.0));
        assert!(!report.passed);
    }
}
