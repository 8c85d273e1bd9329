use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use indexmap::IndexMap;
use serde::Deserialize;
use surge_core::{IterationPause, RunOptions, ThresholdSet};

/// On-disk run parameters. Every field is optional; CLI flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RunFile {
    pub base_url: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<YamlDuration>,
    #[serde(default, deserialize_with = "deserialize_pause")]
    pub pause: Option<IterationPause>,
    pub timeout: Option<YamlDuration>,
    pub latency_ceiling: Option<YamlDuration>,
    pub graceful_stop: Option<YamlDuration>,
    pub branch_office: Option<String>,

    /// Absent keeps the default spike thresholds; `{}` disables them. Rules keep file order.
    pub thresholds: Option<IndexMap<String, ThresholdExprYaml>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<String>),
    Labeled { label: String, expr: OneOrMany },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_pause<'de, D>(deserializer: D) -> Result<Option<IterationPause>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Secs(f64),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(Raw::Secs(v)) => {
            let d = Duration::try_from_secs_f64(v).map_err(serde::de::Error::custom)?;
            Ok(Some(if d.is_zero() {
                IterationPause::None
            } else {
                IterationPause::Fixed(d)
            }))
        }
    }
}

impl RunFile {
    pub(crate) fn parse(src: &str) -> anyhow::Result<Self> {
        let file: Self = serde_yaml::from_str(src).context("invalid config yaml")?;
        Ok(file)
    }

    pub(crate) fn into_options(self) -> RunOptions {
        let thresholds = self.thresholds.map(|map| {
            map.into_iter()
                .map(|(metric, exprs)| match exprs {
                    ThresholdExprYaml::One(e) => ThresholdSet::new(metric, [e]),
                    ThresholdExprYaml::Many(v) => ThresholdSet::new(metric, v),
                    ThresholdExprYaml::Labeled { label, expr } => {
                        ThresholdSet::new(metric, expr.into_vec()).with_label(label)
                    }
                })
                .collect()
        });

        RunOptions {
            base_url: self.base_url,
            vus: self.vus,
            duration: self.duration.map(YamlDuration::into_inner),
            pause: self.pause,
            request_timeout: self.timeout.map(YamlDuration::into_inner),
            latency_ceiling: self.latency_ceiling.map(YamlDuration::into_inner),
            graceful_stop: self.graceful_stop.map(YamlDuration::into_inner),
            branch_office: self.branch_office,
            thresholds,
        }
    }
}

pub(crate) async fn load(path: &Path) -> anyhow::Result<RunOptions> {
    let src = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let file = RunFile::parse(&src).with_context(|| format!("config: {}", path.display()))?;
    Ok(file.into_options())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> RunOptions {
        match RunFile::parse(src) {
            Ok(f) => f.into_options(),
            Err(err) => panic!("parse failed: {err:#}"),
        }
    }

    #[test]
    fn parses_full_file() {
        let opts = parse(
            r#"
baseUrl: http://tickets.internal:8080
vus: 200
duration: 1m
pause: 100ms..500ms
timeout: 2.5
latencyCeiling: 3s
branchOffice: Centro
thresholds:
  http_req_duration: "p(95)<2000"
  ticket_errors: ["rate<0.01", "rate<=0.02"]
  tickets_created:
    label: enough tickets
    expr: count>500
"#,
        );

        assert_eq!(opts.base_url.as_deref(), Some("http://tickets.internal:8080"));
        assert_eq!(opts.vus, Some(200));
        assert_eq!(opts.duration, Some(Duration::from_secs(60)));
        assert_eq!(
            opts.pause,
            Some(IterationPause::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_millis(500),
            })
        );
        assert_eq!(opts.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(opts.latency_ceiling, Some(Duration::from_secs(3)));
        assert_eq!(opts.branch_office.as_deref(), Some("Centro"));

        let thresholds = opts.thresholds.unwrap_or_default();
        assert_eq!(
            thresholds,
            vec![
                ThresholdSet::new("http_req_duration", ["p(95)<2000"]),
                ThresholdSet::new("ticket_errors", ["rate<0.01", "rate<=0.02"]),
                ThresholdSet::new("tickets_created", ["count>500"]).with_label("enough tickets"),
            ]
        );
    }

    #[test]
    fn thresholds_keep_file_order() {
        let opts = parse(
            r#"
thresholds:
  tickets_created: count>0
  ticket_errors: rate<0.5
  http_req_duration: max<5000
"#,
        );

        let metrics: Vec<String> = opts
            .thresholds
            .unwrap_or_default()
            .into_iter()
            .map(|set| set.metric)
            .collect();
        assert_eq!(
            metrics,
            ["tickets_created", "ticket_errors", "http_req_duration"]
        );
    }

    #[test]
    fn empty_file_sets_nothing() {
        assert_eq!(parse("{}"), RunOptions::default());
    }

    #[test]
    fn empty_threshold_map_disables_defaults() {
        assert_eq!(parse("thresholds: {}").thresholds, Some(Vec::new()));
    }

    #[test]
    fn pause_accepts_none_and_seconds() {
        assert_eq!(parse("pause: none").pause, Some(IterationPause::None));
        assert_eq!(
            parse("pause: 0.25").pause,
            Some(IterationPause::Fixed(Duration::from_millis(250)))
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(RunFile::parse("iterations: 10").is_err());
        assert!(RunFile::parse("duration: soon").is_err());
        assert!(RunFile::parse("pause: 2s..1s").is_err());
        assert!(RunFile::parse("vus: -1").is_err());
    }
}
