use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use surge_metrics::Registry;

use crate::thresholds::{ThresholdRule, ThresholdSet, compile_thresholds, default_spike_thresholds};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const TICKETS_PATH: &str = "/api/tickets";
pub const DEFAULT_BRANCH_OFFICE: &str = "Spike Test Branch";
pub const DEFAULT_VUS: u64 = 50;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LATENCY_CEILING: Duration = Duration::from_secs(5);

/// Think time between two iterations of the same VU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IterationPause {
    /// Back-to-back iterations (spike profile).
    #[default]
    None,
    Fixed(Duration),
    Uniform {
        min: Duration,
        max: Duration,
    },
}

impl IterationPause {
    pub fn uniform(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidPauseRange { min, max });
        }
        Ok(Self::Uniform { min, max })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Uniform { min, max } if min == max => min,
            Self::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }

    /// Whether any iteration could sleep.
    #[must_use]
    pub fn is_none(&self) -> bool {
        match *self {
            Self::None => true,
            Self::Fixed(d) => d.is_zero(),
            Self::Uniform { max, .. } => max.is_zero(),
        }
    }
}

impl FromStr for IterationPause {
    type Err = Error;

    /// Accepts `none`, a humantime duration (`250ms`), or a range (`100ms..1s`).
    fn from_str(raw: &str) -> Result<Self> {
        let s = raw.trim();
        let invalid = |error: String| Error::InvalidPause {
            raw: raw.to_string(),
            error,
        };

        if s.eq_ignore_ascii_case("none") || s == "0" {
            return Ok(Self::None);
        }

        if let Some((min, max)) = s.split_once("..") {
            let min = humantime::parse_duration(min.trim()).map_err(|e| invalid(e.to_string()))?;
            let max = humantime::parse_duration(max.trim()).map_err(|e| invalid(e.to_string()))?;
            return Self::uniform(min, max);
        }

        let d = humantime::parse_duration(s).map_err(|e| invalid(e.to_string()))?;
        Ok(if d.is_zero() { Self::None } else { Self::Fixed(d) })
    }
}

impl fmt::Display for IterationPause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Fixed(d) => write!(f, "{}", humantime::format_duration(*d)),
            Self::Uniform { min, max } => write!(
                f,
                "{}..{}",
                humantime::format_duration(*min),
                humantime::format_duration(*max)
            ),
        }
    }
}

/// Endpoint every iteration posts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    base_url: String,
    path: String,
}

impl Target {
    pub fn new(base_url: &str, path: &str) -> Result<Self> {
        let invalid = |error: &str| Error::InvalidBaseUrl {
            url: base_url.to_string(),
            error: error.to_string(),
        };

        let parsed = url::Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(invalid("only http:// and https:// are supported"));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            path: format!("/{}", path.trim_start_matches('/')),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

/// Validated, immutable parameters of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub vus: u64,
    pub duration: Duration,
    pub pause: IterationPause,
    pub request_timeout: Duration,
    /// Latency above which a response counts as slow. Advisory: feeds the `checks` rate only.
    pub latency_ceiling: Duration,
    /// How long in-flight iterations may run past `duration` before they are interrupted.
    pub graceful_stop: Duration,
    pub target: Target,
    pub branch_office: String,
    pub thresholds: Vec<ThresholdRule>,
}

/// Raw run parameters from one source (config file, CLI). Unset fields fall through to the
/// next source, then to the spike defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub base_url: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub pause: Option<IterationPause>,
    pub request_timeout: Option<Duration>,
    pub latency_ceiling: Option<Duration>,
    pub graceful_stop: Option<Duration>,
    pub branch_office: Option<String>,
    /// `None` selects the default spike thresholds; an empty list disables thresholds.
    pub thresholds: Option<Vec<ThresholdSet>>,
}

impl RunOptions {
    /// Layers `overrides` on top of `self`. Thresholds are replaced per metric.
    #[must_use]
    pub fn merge(self, overrides: RunOptions) -> RunOptions {
        let thresholds = match (self.thresholds, overrides.thresholds) {
            (base, None) => base,
            (None, Some(over)) => Some(over),
            (Some(mut base), Some(over)) => {
                base.retain(|b| !over.iter().any(|o| o.metric == b.metric));
                base.extend(over);
                Some(base)
            }
        };

        RunOptions {
            base_url: overrides.base_url.or(self.base_url),
            vus: overrides.vus.or(self.vus),
            duration: overrides.duration.or(self.duration),
            pause: overrides.pause.or(self.pause),
            request_timeout: overrides.request_timeout.or(self.request_timeout),
            latency_ceiling: overrides.latency_ceiling.or(self.latency_ceiling),
            graceful_stop: overrides.graceful_stop.or(self.graceful_stop),
            branch_office: overrides.branch_office.or(self.branch_office),
            thresholds,
        }
    }

    /// Validates every field and compiles thresholds against the metrics in `metrics`.
    pub fn into_config(self, metrics: &Registry) -> Result<RunConfig> {
        let vus = self.vus.unwrap_or(DEFAULT_VUS);
        if vus == 0 {
            return Err(Error::InvalidVus);
        }

        let duration = self.duration.unwrap_or(DEFAULT_DURATION);
        if duration.is_zero() {
            return Err(Error::InvalidDuration);
        }

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }

        let pause = self.pause.unwrap_or_default();
        if let IterationPause::Uniform { min, max } = pause
            && min > max
        {
            return Err(Error::InvalidPauseRange { min, max });
        }

        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let target = Target::new(base_url, TICKETS_PATH)?;

        let sets = self.thresholds.unwrap_or_else(default_spike_thresholds);
        let thresholds = compile_thresholds(&sets, metrics)?;

        Ok(RunConfig {
            vus,
            duration,
            pause,
            request_timeout,
            latency_ceiling: self.latency_ceiling.unwrap_or(DEFAULT_LATENCY_CEILING),
            graceful_stop: self.graceful_stop.unwrap_or(request_timeout),
            target,
            branch_office: self
                .branch_office
                .unwrap_or_else(|| DEFAULT_BRANCH_OFFICE.to_string()),
            thresholds,
        })
    }
}
