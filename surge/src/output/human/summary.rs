use std::fmt::Write as _;

use surge_core::metrics::{MetricsSnapshot, SeriesValue, TrendSnapshot};
use surge_core::{CHECK_STATUS, RunReport};

use super::format::{format_elapsed, format_ms, format_pct, format_rate, format_tags_inline};

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let snap = &report.metrics;
    let sched = &report.scheduler;

    out.push_str("summary\n");
    writeln!(out, "  target: {}", report.config.target).ok();
    writeln!(
        out,
        "  vus: {} duration: {} pause: {}",
        report.config.vus, report.config.duration, report.config.pause
    )
    .ok();
    writeln!(
        out,
        "  elapsed: {} ({})",
        format_elapsed(sched.elapsed),
        sched.stop_reason
    )
    .ok();
    writeln!(
        out,
        "  iterations: {} (interrupted {})",
        sched.completed_iterations, sched.interrupted_iterations
    )
    .ok();

    render_requests(snap, &mut out);
    render_tickets(snap, &mut out);
    render_checks(snap, &mut out);
    render_thresholds(report, &mut out);

    out
}

fn trend_line(name: &str, t: &TrendSnapshot) -> String {
    let s = t.summary();
    format!(
        "  {name} = avg={} min={} med={} p90={} p95={} p99={} max={} (n={})",
        format_ms(s.avg),
        format_ms(s.min),
        format_ms(s.med),
        format_ms(s.p90),
        format_ms(s.p95),
        format_ms(s.p99),
        format_ms(s.max),
        s.count
    )
}

fn render_requests(snap: &MetricsSnapshot, out: &mut String) {
    out.push_str("\nrequests\n");

    let total = snap.counter("http_reqs").unwrap_or(0);
    let secs = snap.elapsed.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  http_reqs: {total} (rps={})",
        format_rate(total as f64 / secs)
    )
    .ok();

    let by_status = series_counts(snap, "http_reqs", "status");
    if !by_status.is_empty() {
        writeln!(out, "  by status: {by_status}").ok();
    }

    if let Some(r) = snap.rate("http_req_failed") {
        writeln!(
            out,
            "  http_req_failed: {} ({}/{})",
            format_pct(r.rate),
            r.hits,
            r.total
        )
        .ok();
    }

    let errors = series_counts(snap, "http_req_errors", "error_kind");
    if !errors.is_empty() {
        writeln!(out, "  transport errors: {errors}").ok();
    }

    match snap.trend("http_req_duration") {
        Some(t) if t.count() > 0 => {
            writeln!(out, "{}", trend_line("http_req_duration", t)).ok();
        }
        _ => out.push_str("  http_req_duration: n/a\n"),
    }
}

/// `201=40 500=2` for every series of `name` tagged with `key`.
fn series_counts(snap: &MetricsSnapshot, name: &str, key: &str) -> String {
    snap.series_by_tag(name, key)
        .filter_map(|(value, v)| match v {
            SeriesValue::Counter(n) if *n > 0 => Some(format!("{value}={n}")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_tickets(snap: &MetricsSnapshot, out: &mut String) {
    out.push_str("\ntickets\n");
    writeln!(
        out,
        "  created: {}",
        snap.counter("tickets_created").unwrap_or(0)
    )
    .ok();
    writeln!(
        out,
        "  degraded: {}",
        snap.counter("tickets_degraded").unwrap_or(0)
    )
    .ok();
    if let Some(r) = snap.rate("ticket_errors") {
        writeln!(
            out,
            "  errors: {} ({}/{})",
            format_pct(r.rate),
            r.hits,
            r.total
        )
        .ok();
    }
    if let Some(t) = snap.trend("create_latency").filter(|t| t.count() > 0) {
        writeln!(out, "{}", trend_line("create_latency", t)).ok();
    }
}

fn render_checks(snap: &MetricsSnapshot, out: &mut String) {
    let mut rows: Vec<_> = snap
        .series
        .iter()
        .filter(|s| s.name == "checks")
        .filter_map(|s| match &s.value {
            SeriesValue::Rate(r) => Some((s, r)),
            _ => None,
        })
        .collect();
    if rows.is_empty() {
        return;
    }

    // Status check first, then by name.
    rows.sort_by_key(|(s, _)| {
        let name = check_name(&s.tags);
        (name != CHECK_STATUS, name.to_string())
    });

    out.push_str("\nchecks\n");
    for (s, r) in rows {
        let fail = r.total.saturating_sub(r.hits);
        let status = if fail > 0 { "FAIL" } else { "OK" };
        writeln!(
            out,
            "  {}{}: pass={} fail={fail} [{status}]",
            check_name(&s.tags),
            format_tags_inline(&s.tags, &["check"]),
            r.hits
        )
        .ok();
    }
}

fn check_name(tags: &[(String, String)]) -> &str {
    tags.iter()
        .find(|(k, _)| k == "check")
        .map_or("-", |(_, v)| v.as_str())
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    let results = &report.thresholds.results;
    if results.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for r in results {
        let observed = r.observed.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
        let status = if r.passed { "OK" } else { "FAIL" };
        writeln!(
            out,
            "  {}: {} observed={observed} [{status}]",
            r.display_name(),
            r.expression
        )
        .ok();
    }
    writeln!(
        out,
        "  verdict: {}",
        if report.passed() { "PASS" } else { "FAIL" }
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::testing::sample_report;

    #[test]
    fn render_includes_run_and_request_totals() {
        let text = render(&sample_report());
        assert!(text.contains("target: http://localhost:8080/api/tickets"));
        assert!(text.contains("vus: 10 duration: 2s pause: none"));
        assert!(text.contains("elapsed: 2.0s (completed)"));
        assert!(text.contains("http_reqs: 51 (rps="));
        assert!(text.contains("by status: 0=1 201=48 500=2"));
        assert!(text.contains("http_req_duration = avg="));
        assert!(text.contains("min=20.00ms"));
        assert!(text.contains("(n=51)"));
    }

    #[test]
    fn render_includes_ticket_outcomes() {
        let text = render(&sample_report());
        assert!(text.contains("created: 48"));
        assert!(text.contains("errors: 1.96% (1/51)"));
    }

    #[test]
    fn render_marks_each_threshold() {
        let mut report = sample_report();
        let text = render(&report);
        assert!(text.contains("tickets_created: count>40 observed=48.000 [OK]"));
        assert!(text.contains("verdict: PASS"));

        report.thresholds.passed = false;
        if let Some(r) = report.thresholds.results.first_mut() {
            r.passed = false;
        }
        let text = render(&report);
        assert!(text.contains("[FAIL]"));
        assert!(text.contains("verdict: FAIL"));
    }

    #[test]
    fn render_skips_empty_sections() {
        let mut report = sample_report();
        report.thresholds.results.clear();
        let text = render(&report);
        assert!(!text.contains("\nthresholds\n"));
        assert!(!text.contains("\nchecks\n"));
    }
}
