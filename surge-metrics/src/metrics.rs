use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Monotonic sum of increments.
    Counter,
    /// Fraction of observations that matched.
    Rate,
    /// Distribution of observed values.
    Trend,
}

/// How trend samples are interpreted when summarized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Samples are plain numbers and are reported as recorded.
    #[default]
    Default,
    /// Samples are recorded in microseconds and reported in milliseconds.
    Time,
}

impl ValueType {
    pub(crate) fn scale(self, raw: f64) -> f64 {
        match self {
            ValueType::Default => raw,
            ValueType::Time => raw / 1_000.0,
        }
    }
}

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Upper bound: 1 hour in microseconds. Larger samples saturate.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Nearest-rank percentile: the smallest sample with at least `p`% of samples at or below it.
///
/// `rank = ceil(p / 100 * n)`, clamped to `[1, n]`. Returns `None` for an empty histogram.
/// Values are reported at the lower bound of their bucket (exact below 2048).
pub(crate) fn nearest_rank(h: &Histogram<u64>, p: f64) -> Option<u64> {
    let n = h.len();
    if n == 0 {
        return None;
    }

    // Multiply before dividing so integral percentiles of integral counts stay exact.
    let rank = ((p * n as f64) / 100.0).ceil().clamp(1.0, n as f64) as u64;

    let mut seen = 0u64;
    for v in h.iter_recorded() {
        seen = seen.saturating_add(v.count_at_value());
        if seen >= rank {
            return Some(h.lowest_equivalent(v.value_iterated_to()));
        }
    }

    Some(h.lowest_equivalent(h.max()))
}

#[derive(Debug, Default)]
pub struct Rate {
    total: AtomicU64,
    hits: AtomicU64,
}

impl Rate {
    #[inline]
    pub fn add(&self, matched: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if matched {
            // Release pairs with the Acquire in `load`, so a reader never sees hits > total.
            self.hits.fetch_add(1, Ordering::Release);
        }
    }

    /// Returns `(total, hits)`.
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Relaxed);
        (total.max(hits), hits)
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => {
                MetricStorage::Trend(Arc::new(Mutex::new(new_default_histogram())))
            }
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }
}

/// Write handle for one series. Cloning is cheap; keep one per hot path to skip map lookups.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Rate(Arc<Rate>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, matched: bool) {
        if let MetricHandle::Rate(r) = self {
            r.add(matched);
        }
    }

    #[inline]
    pub fn observe(&self, value: u64) {
        if let MetricHandle::Trend(h) = self {
            h.lock().saturating_record(value);
        }
    }

    /// Records a duration sample in microseconds (the storage unit of time trends).
    #[inline]
    pub fn observe_duration(&self, value: Duration) {
        self.observe(value.as_micros().try_into().unwrap_or(u64::MAX));
    }

    pub fn get_counter(&self) -> u64 {
        match self {
            MetricHandle::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Returns `(total, hits)` for rate handles.
    pub fn get_rate(&self) -> (u64, u64) {
        match self {
            MetricHandle::Rate(r) => r.load(),
            _ => (0, 0),
        }
    }

    pub fn get_trend_count(&self) -> u64 {
        match self {
            MetricHandle::Trend(h) => h.lock().len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram_of(values: impl IntoIterator<Item = u64>) -> Histogram<u64> {
        let mut h = new_default_histogram();
        for v in values {
            h.saturating_record(v);
        }
        h
    }

    #[test]
    fn nearest_rank_of_one_to_hundred() {
        let h = histogram_of(1..=100);
        assert_eq!(nearest_rank(&h, 95.0), Some(95));
        assert_eq!(nearest_rank(&h, 50.0), Some(50));
        assert_eq!(nearest_rank(&h, 99.0), Some(99));
        assert_eq!(nearest_rank(&h, 100.0), Some(100));
        assert_eq!(nearest_rank(&h, 0.0), Some(1));
    }

    #[test]
    fn nearest_rank_rounds_rank_up() {
        // rank = ceil(0.9 * 5) = 5
        let h = histogram_of([10, 20, 30, 40, 50]);
        assert_eq!(nearest_rank(&h, 90.0), Some(50));
        // rank = ceil(0.5 * 5) = 3
        assert_eq!(nearest_rank(&h, 50.0), Some(30));
    }

    #[test]
    fn nearest_rank_empty_is_none() {
        assert_eq!(nearest_rank(&new_default_histogram(), 95.0), None);
    }

    #[test]
    fn handles_update_their_storage() {
        let c = MetricStorage::new(MetricKind::Counter).handle();
        c.increment();
        c.add(4);
        assert_eq!(c.get_counter(), 5);

        let r = MetricStorage::new(MetricKind::Rate).handle();
        r.add_rate(true);
        r.add_rate(false);
        r.add_rate(false);
        assert_eq!(r.get_rate(), (3, 1));

        let t = MetricStorage::new(MetricKind::Trend).handle();
        t.observe(7);
        t.observe_duration(Duration::from_millis(2));
        assert_eq!(t.get_trend_count(), 2);
    }

    #[test]
    fn handles_ignore_mismatched_operations() {
        let c = MetricStorage::new(MetricKind::Counter).handle();
        c.add_rate(true);
        c.observe(10);
        assert_eq!(c.get_counter(), 0);
        assert_eq!(c.get_rate(), (0, 0));
    }

    #[test]
    fn trend_saturates_instead_of_dropping() {
        let t = MetricStorage::new(MetricKind::Trend).handle();
        t.observe(u64::MAX);
        assert_eq!(t.get_trend_count(), 1);
    }
}
