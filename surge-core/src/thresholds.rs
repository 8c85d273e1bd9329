use std::fmt;

use surge_metrics::{MetricKind, Registry};

use crate::{Error, Result};

/// Raw threshold expressions for one metric, as written in a config file or on the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub expressions: Vec<String>,
    /// Display name for the rule. Only `count` rules may carry one.
    pub label: Option<String>,
}

impl ThresholdSet {
    pub fn new(
        metric: impl Into<String>,
        expressions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            metric: metric.into(),
            expressions: expressions.into_iter().map(Into::into).collect(),
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ThresholdOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "==")]
    Eq,
}

impl ThresholdOp {
    #[must_use]
    pub fn compare(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Lte => observed <= bound,
            Self::Gt => observed > bound,
            Self::Gte => observed >= bound,
            Self::Eq => observed == bound,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
        }
    }
}

impl fmt::Display for ThresholdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    P(f64),
}

impl ThresholdAgg {
    /// Whether this aggregation is defined for metrics of `kind`.
    #[must_use]
    pub fn applies_to(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter | MetricKind::Rate => matches!(self, Self::Count | Self::Rate),
            MetricKind::Trend => !matches!(self, Self::Rate),
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// A parsed threshold bound to a registered metric. Built once before the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    pub kind: MetricKind,
    pub expression: String,
    pub label: Option<String>,
    pub expr: ThresholdExpr,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        other => {
            let Some(inner) = other.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) else {
                return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("threshold bound must be finite: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// Parses every expression and binds it to a metric registered in `metrics`.
///
/// Rules keep the order of `sets`, then the order of expressions within each set.
pub fn compile_thresholds(
    sets: &[ThresholdSet],
    metrics: &Registry,
) -> Result<Vec<ThresholdRule>> {
    let mut out = Vec::new();

    for set in sets {
        let (_, kind) = metrics
            .lookup(&set.metric)
            .ok_or_else(|| Error::UnknownMetric(set.metric.clone()))?;

        for raw in &set.expressions {
            let expr = parse_threshold_expr(raw).map_err(|error| Error::InvalidThresholdExpr {
                metric: set.metric.clone(),
                error,
            })?;

            if !expr.agg.applies_to(kind) {
                return Err(Error::AggregationMismatch {
                    metric: set.metric.clone(),
                    agg: expr.agg.to_string(),
                    kind,
                });
            }
            if set.label.is_some() && expr.agg != ThresholdAgg::Count {
                return Err(Error::LabelOnNonCount {
                    metric: set.metric.clone(),
                });
            }

            out.push(ThresholdRule {
                metric: set.metric.clone(),
                kind,
                expression: raw.trim().to_string(),
                label: set.label.clone(),
                expr,
            });
        }
    }

    Ok(out)
}

/// Thresholds applied when a run does not declare its own.
#[must_use]
pub fn default_spike_thresholds() -> Vec<ThresholdSet> {
    vec![
        ThresholdSet::new("http_req_duration", ["p(95)<3000"]),
        ThresholdSet::new("ticket_errors", ["rate<0.05"]),
        ThresholdSet::new("tickets_created", ["count>40"]),
    ]
}
