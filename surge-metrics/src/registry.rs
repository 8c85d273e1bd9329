use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricStorage, ValueType};
use crate::snapshot::{MetricsSnapshot, RateSnapshot, SeriesSnapshot, SeriesValue, TrendSnapshot};
use crate::tags::TagSet;

/// Opaque id of a registered metric. Only a [`Registry`] hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
    value_type: ValueType,
}

/// Named, typed metrics shared by every virtual user of a run.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Registers `name` (idempotent). A second registration returns the first id and keeps
    /// the original kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        self.register_with(name, kind, ValueType::Default)
    }

    /// Registers a trend whose samples are durations.
    pub fn register_time_trend(&self, name: &str) -> MetricId {
        self.register_with(name, MetricKind::Trend, ValueType::Time)
    }

    fn register_with(&self, name: &str, kind: MetricKind, value_type: ValueType) -> MetricId {
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name_id) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
            value_type,
        });
        self.storage.insert(id, DashMap::new());
        id
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .position(|d| d.name == name_id)
            .map(|idx| (MetricId(idx as u32), defs[idx].kind))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        let mut resolved: Vec<(KeyId, KeyId)> = tags
            .iter()
            .map(|(k, v)| {
                (
                    self.interner.get_or_intern(k),
                    self.interner.get_or_intern(v),
                )
            })
            .collect();
        resolved.sort_unstable();
        resolved.dedup_by_key(|(k, _)| *k);
        TagSet::from_sorted_iter(resolved)
    }

    /// Returns the write handle for one series, creating the series on first use.
    pub fn get_handle(&self, metric: MetricId, tags: &TagSet) -> Option<MetricHandle> {
        {
            let series_map = self.storage.get(&metric)?;
            if let Some(storage) = series_map.get(tags) {
                return Some(storage.handle());
            }
        }

        // Looked up with no storage guard held; `register` takes these locks in reverse order.
        let kind = self.kind(metric)?;

        // `entry` keeps creation atomic: concurrent first writers share one storage.
        let series_map = self.storage.get(&metric)?;
        let storage = series_map
            .entry(tags.clone())
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    pub fn increment_counter(&self, metric: MetricId, tags: &TagSet) {
        if let Some(h) = self.get_handle(metric, tags) {
            h.increment();
        }
    }

    pub fn record_rate(&self, metric: MetricId, tags: &TagSet, matched: bool) {
        if let Some(h) = self.get_handle(metric, tags) {
            h.add_rate(matched);
        }
    }

    pub fn record_trend(&self, metric: MetricId, tags: &TagSet, value: u64) {
        if let Some(h) = self.get_handle(metric, tags) {
            h.observe(value);
        }
    }

    pub fn record_duration(&self, metric: MetricId, tags: &TagSet, value: Duration) {
        if let Some(h) = self.get_handle(metric, tags) {
            h.observe_duration(value);
        }
    }

    fn resolve(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Consistent view of all metrics. Safe to call while writers are active; after every
    /// writer has finished it is exact.
    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let mut out = MetricsSnapshot {
            elapsed,
            ..MetricsSnapshot::default()
        };

        let defs = self.defs.read();
        for (idx, def) in defs.iter().enumerate() {
            let name = self.resolve(def.name);
            let id = MetricId(idx as u32);

            let mut counter_total = 0u64;
            let mut rate_total = RateSnapshot::default();
            let mut trend_total = TrendSnapshot::new(def.value_type);

            if let Some(series_map) = self.storage.get(&id) {
                for series in series_map.iter() {
                    let tags: Vec<(String, String)> = series
                        .key()
                        .iter()
                        .map(|(k, v)| (self.resolve(k), self.resolve(v)))
                        .collect();

                    let value = match series.value() {
                        MetricStorage::Counter(c) => {
                            let v = c.load(Ordering::Relaxed);
                            counter_total = counter_total.saturating_add(v);
                            SeriesValue::Counter(v)
                        }
                        MetricStorage::Rate(r) => {
                            let (total, hits) = r.load();
                            let v = RateSnapshot::new(total, hits);
                            rate_total = rate_total.merge(v);
                            SeriesValue::Rate(v)
                        }
                        MetricStorage::Trend(h) => {
                            let h = h.lock();
                            trend_total.merge(&h);
                            let mut v = TrendSnapshot::new(def.value_type);
                            v.merge(&h);
                            SeriesValue::Trend(v)
                        }
                    };

                    out.series.push(SeriesSnapshot {
                        name: name.clone(),
                        kind: def.kind,
                        tags,
                        value,
                    });
                }
            }

            match def.kind {
                MetricKind::Counter => {
                    out.counters.insert(name, counter_total);
                }
                MetricKind::Rate => {
                    out.rates.insert(name, rate_total);
                }
                MetricKind::Trend => {
                    out.trends.insert(name, trend_total);
                }
            }
        }

        out.series
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}
