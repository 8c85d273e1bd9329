use std::time::Duration;

use surge_core::metrics::SeriesValue;
use surge_core::{CHECK_STATUS, RunOptions, RunReport, StopReason, run_spike};
use surge_http::HttpClient;
use surge_testserver::{TestServer, TestServerOptions, TicketMode};
use tokio_util::sync::CancellationToken;

async fn spike(base_url: &str, opts: RunOptions) -> anyhow::Result<RunReport> {
    let opts = RunOptions {
        base_url: Some(base_url.to_string()),
        vus: Some(10),
        duration: Some(Duration::from_secs(2)),
        ..RunOptions::default()
    }
    .merge(opts);
    Ok(run_spike(opts, HttpClient::default(), CancellationToken::new()).await?)
}

async fn spike_against(
    mode: TicketMode,
    delay: Duration,
) -> anyhow::Result<(RunReport, TestServer)> {
    let server = TestServer::start_with(TestServerOptions { mode, delay }).await?;
    let report = spike(server.base_url(), RunOptions::default()).await?;
    Ok((report, server))
}

fn failed_rules(report: &RunReport) -> Vec<&str> {
    report
        .thresholds
        .violations()
        .map(|r| r.metric.as_str())
        .collect()
}

fn check_rate(report: &RunReport, check: &str) -> Option<f64> {
    report
        .metrics
        .series_by_tag("checks", "check")
        .find(|(name, _)| *name == check)
        .and_then(|(_, v)| match v {
            SeriesValue::Rate(r) => r.rate,
            _ => None,
        })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn healthy_endpoint_passes_all_thresholds() -> anyhow::Result<()> {
    let (report, server) = spike_against(TicketMode::Created, Duration::ZERO).await?;

    let created = report.metrics.counter("tickets_created").unwrap_or(0);
    assert!(created > 40, "tickets_created={created}");
    assert_eq!(
        report.metrics.rate("ticket_errors").and_then(|r| r.rate),
        Some(0.0)
    );
    assert!(report.passed(), "violations: {:?}", failed_rules(&report));
    assert_eq!(report.scheduler.stop_reason, StopReason::Completed);
    assert_eq!(check_rate(&report, CHECK_STATUS), Some(1.0));

    // Every request reached the handler, was JSON, and passed validation.
    assert_eq!(server.stats().rejected(), 0);
    assert_eq!(server.stats().tickets_created(), created);
    assert_eq!(server.stats().saw_json_content_type(), server.stats().requests_total());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unavailable_endpoint_fails_the_ticket_count() -> anyhow::Result<()> {
    let (report, server) = spike_against(TicketMode::Unavailable, Duration::ZERO).await?;

    assert_eq!(report.metrics.counter("tickets_created"), Some(0));
    assert_eq!(
        report.metrics.rate("ticket_errors").and_then(|r| r.rate),
        Some(1.0)
    );
    assert!(!report.passed());
    let failed = failed_rules(&report);
    assert!(failed.contains(&"tickets_created"), "failed={failed:?}");
    assert!(failed.contains(&"ticket_errors"), "failed={failed:?}");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn degraded_responses_are_tolerated_but_create_nothing() -> anyhow::Result<()> {
    let (report, server) = spike_against(TicketMode::Degraded, Duration::ZERO).await?;

    assert!(report.metrics.counter("tickets_degraded").unwrap_or(0) > 0);
    assert_eq!(
        report.metrics.rate("ticket_errors").and_then(|r| r.rate),
        Some(0.0)
    );
    assert_eq!(check_rate(&report, CHECK_STATUS), Some(1.0));
    assert_eq!(failed_rules(&report), ["tickets_created"]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_responses_fail_the_latency_check_without_gating() -> anyhow::Result<()> {
    let server = TestServer::start_with(TestServerOptions {
        mode: TicketMode::Created,
        delay: Duration::from_millis(100),
    })
    .await?;
    let report = spike(
        server.base_url(),
        RunOptions {
            latency_ceiling: Some(Duration::from_millis(20)),
            ..RunOptions::default()
        },
    )
    .await?;

    assert_eq!(check_rate(&report, "response time < 20ms"), Some(0.0));
    assert!(report.passed(), "violations: {:?}", failed_rules(&report));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_endpoint_finishes_and_fails() -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let report = spike(
        "http://127.0.0.1:1",
        RunOptions {
            duration: Some(Duration::from_millis(500)),
            request_timeout: Some(Duration::from_secs(1)),
            ..RunOptions::default()
        },
    )
    .await?;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.metrics.counter("tickets_created"), Some(0));
    assert_eq!(
        report.metrics.rate("ticket_errors").and_then(|r| r.rate),
        Some(1.0)
    );
    assert!(report.metrics.counter("http_req_errors").unwrap_or(0) > 0);
    assert!(!report.passed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stored_report_can_be_reevaluated() -> anyhow::Result<()> {
    let (report, server) = spike_against(TicketMode::Created, Duration::ZERO).await?;
    server.shutdown().await;

    let reg = surge_core::metrics::Registry::default();
    surge_core::ScenarioMetricIds::register(&reg);
    let strict = surge_core::compile_thresholds(
        &[surge_core::ThresholdSet::new("tickets_created", ["count>1000000"])],
        &reg,
    )?;

    assert!(report.passed());
    assert!(!report.reevaluate(&strict).passed);
    assert_eq!(report.reevaluate(&[]).results.len(), 0);
    Ok(())
}
