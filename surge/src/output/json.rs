use std::io::Write as _;
use std::sync::Arc;

use serde::Serialize;
use surge_core::{ProgressFn, ProgressUpdate, RunConfig, RunReport};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &RunConfig) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&JsonSummaryLine {
            kind: "summary",
            report,
        });
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub interval_secs: f64,
    pub completion: f64,
    pub vus: u64,

    pub requests_total: u64,
    pub iterations_total: u64,
    pub tickets_created: u64,
    pub tickets_degraded: u64,
    pub ticket_errors: u64,

    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let snap = &u.snapshot;
    let latency = snap.trend("http_req_duration");

    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        interval_secs: u.interval.as_secs_f64(),
        completion: u.completion(),
        vus: u.vus,

        requests_total: snap.counter("http_reqs").unwrap_or(0),
        iterations_total: snap.counter("iterations").unwrap_or(0),
        tickets_created: snap.counter("tickets_created").unwrap_or(0),
        tickets_degraded: snap.counter("tickets_degraded").unwrap_or(0),
        ticket_errors: snap.rate("ticket_errors").map_or(0, |r| r.hits),

        latency_p50_ms: latency.and_then(|t| t.percentile(50.0)),
        latency_p95_ms: latency.and_then(|t| t.percentile(95.0)),
        latency_max_ms: latency.and_then(|t| t.max()),
    }
}

#[derive(Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    #[serde(flatten)]
    pub report: &'a RunReport,
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
