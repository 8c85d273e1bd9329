pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("vu {vu_id} panicked during init")]
    VuInitPanicked { vu_id: u64 },

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("invalid `pause` `{raw}` (expected `none`, a duration, or `MIN..MAX`): {error}")]
    InvalidPause { raw: String, error: String },

    #[error("`pause` range minimum {min:?} is greater than maximum {max:?}")]
    InvalidPauseRange {
        min: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("invalid base url `{url}`: {error}")]
    InvalidBaseUrl { url: String, error: String },

    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThresholdExpr { metric: String, error: String },

    #[error("threshold references unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("aggregation `{agg}` is not defined for {kind} metric `{metric}`")]
    AggregationMismatch {
        metric: String,
        agg: String,
        kind: surge_metrics::MetricKind,
    },

    #[error("threshold label on `{metric}` is only allowed for `count` rules")]
    LabelOnNonCount { metric: String },
}

impl Error {
    /// Whether the error was caused by run parameters rather than by the run itself.
    #[must_use]
    pub fn is_config(&self) -> bool {
        !matches!(self, Self::Join(_) | Self::VuInitPanicked { .. })
    }
}
