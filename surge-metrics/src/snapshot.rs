use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Serialize, Serializer};

use crate::metrics::{MetricKind, ValueType, nearest_rank, new_default_histogram};

/// Point-in-time view of every registered metric, merged across tag series.
///
/// Metrics with no observations are still present (zero counters, empty rates and trends),
/// so evaluating a rule against a silent metric yields an observed value instead of a miss.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub counters: BTreeMap<String, u64>,
    pub rates: BTreeMap<String, RateSnapshot>,
    pub trends: BTreeMap<String, TrendSnapshot>,
    /// Every tagged series, sorted by metric name.
    pub series: Vec<SeriesSnapshot>,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    #[must_use]
    pub fn rate(&self, name: &str) -> Option<&RateSnapshot> {
        self.rates.get(name)
    }

    #[must_use]
    pub fn trend(&self, name: &str) -> Option<&TrendSnapshot> {
        self.trends.get(name)
    }

    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        if self.counters.contains_key(name) {
            Some(MetricKind::Counter)
        } else if self.rates.contains_key(name) {
            Some(MetricKind::Rate)
        } else if self.trends.contains_key(name) {
            Some(MetricKind::Trend)
        } else {
            None
        }
    }

    /// Series of `name` that carry `key`, keyed by that tag's value.
    pub fn series_by_tag<'a>(
        &'a self,
        name: &'a str,
        key: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a SeriesValue)> + 'a {
        self.series.iter().filter(move |s| s.name == name).filter_map(move |s| {
            s.tags
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| (v.as_str(), &s.value))
        })
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub total: u64,
    pub hits: u64,
    /// `hits / total`, absent when nothing was observed.
    pub rate: Option<f64>,
}

impl RateSnapshot {
    #[must_use]
    pub fn new(total: u64, hits: u64) -> Self {
        let rate = (total > 0).then(|| hits as f64 / total as f64);
        Self { total, hits, rate }
    }

    pub(crate) fn merge(self, other: RateSnapshot) -> RateSnapshot {
        RateSnapshot::new(
            self.total.saturating_add(other.total),
            self.hits.saturating_add(other.hits),
        )
    }
}

/// Merged sample distribution of a trend. Keeps the histogram so arbitrary percentiles
/// can be queried after the run.
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    value_type: ValueType,
    histogram: Histogram<u64>,
}

impl Default for TrendSnapshot {
    fn default() -> Self {
        Self::new(ValueType::Default)
    }
}

impl TrendSnapshot {
    #[must_use]
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            histogram: new_default_histogram(),
        }
    }

    /// Builds a snapshot from raw samples (microseconds for time trends).
    #[must_use]
    pub fn from_samples(value_type: ValueType, samples: impl IntoIterator<Item = u64>) -> Self {
        let mut out = Self::new(value_type);
        for v in samples {
            out.histogram.saturating_record(v);
        }
        out
    }

    pub(crate) fn merge(&mut self, h: &Histogram<u64>) {
        // Both sides share bounds, so `add` cannot fail on range.
        let _ = self.histogram.add(h);
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count() > 0).then(|| self.value_type.scale(self.histogram.mean()))
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        (self.count() > 0).then(|| self.value_type.scale(self.histogram.min() as f64))
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        (self.count() > 0).then(|| {
            let max = self.histogram.lowest_equivalent(self.histogram.max());
            self.value_type.scale(max as f64)
        })
    }

    /// Nearest-rank percentile, `p` in `[0, 100]`.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        nearest_rank(&self.histogram, p).map(|v| self.value_type.scale(v as f64))
    }

    #[must_use]
    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.count(),
            avg: self.mean(),
            min: self.min(),
            med: self.percentile(50.0),
            max: self.max(),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
    }
}

impl Serialize for TrendSnapshot {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.summary().serialize(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSnapshot {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub value: SeriesValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SeriesValue {
    Counter(u64),
    Rate(RateSnapshot),
    Trend(TrendSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_snapshot_computes_fraction() {
        assert_eq!(RateSnapshot::new(0, 0).rate, None);
        assert_eq!(RateSnapshot::new(4, 1).rate, Some(0.25));
        let merged = RateSnapshot::new(4, 1).merge(RateSnapshot::new(6, 4));
        assert_eq!(merged, RateSnapshot::new(10, 5));
    }

    #[test]
    fn time_trend_reports_milliseconds() {
        let t = TrendSnapshot::from_samples(ValueType::Time, [1_000, 2_000, 3_000]);
        assert_eq!(t.count(), 3);
        assert_eq!(t.min(), Some(1.0));
        assert_eq!(t.max(), Some(3.0));
        assert_eq!(t.percentile(50.0), Some(2.0));
    }

    #[test]
    fn empty_trend_summary_has_no_values() {
        let s = TrendSnapshot::new(ValueType::Default).summary();
        assert_eq!(s.count, 0);
        assert!(s.avg.is_none());
        assert!(s.p95.is_none());
    }

    #[test]
    fn trend_serializes_as_summary() {
        let t = TrendSnapshot::from_samples(ValueType::Default, 1..=100);
        let v = serde_json::to_value(&t).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(v["count"], 100);
        assert_eq!(v["p95"], 95.0);
        assert_eq!(v["med"], 50.0);
    }
}
