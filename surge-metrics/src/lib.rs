pub mod key;
pub mod metrics;
pub mod registry;
pub mod snapshot;
pub mod tags;

pub use key::KeyId;
pub use metrics::{MetricHandle, MetricKind, ValueType};
pub use registry::{MetricId, Registry};
pub use snapshot::{
    MetricsSnapshot, RateSnapshot, SeriesSnapshot, SeriesValue, TrendSnapshot, TrendSummary,
};
pub use tags::TagSet;
