use std::sync::{Arc, Mutex};

use surge_core::{ProgressFn, RunConfig, RunReport};

mod format;
mod progress;
mod summary;

use format::{format_elapsed, format_ms, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    requests: u64,
    iterations: u64,
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &RunConfig) {
        println!("target: {}", config.target.url());
        println!(
            "spike: vus={} duration={} pause={} timeout={}",
            config.vus,
            humantime::format_duration(config.duration),
            config.pause,
            humantime::format_duration(config.request_timeout),
        );
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        let prev = Arc::new(Mutex::new(Totals::default()));

        Some(Arc::new(move |u| {
            let snap = &u.snapshot;
            let now = Totals {
                requests: snap.counter("http_reqs").unwrap_or(0),
                iterations: snap.counter("iterations").unwrap_or(0),
            };
            let before = {
                let mut inner = prev.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::replace(&mut *inner, now)
            };

            let dt = u.interval.as_secs_f64().max(1e-9);
            let rps = now.requests.saturating_sub(before.requests) as f64 / dt;
            let iters_per_sec = now.iterations.saturating_sub(before.iterations) as f64 / dt;

            let created = snap.counter("tickets_created").unwrap_or(0);
            let errors = snap.rate("ticket_errors").map_or(0, |r| r.hits);
            let p95 = snap
                .trend("http_req_duration")
                .and_then(|t| t.percentile(95.0));

            let message = format!(
                "vus={} elapsed={} iters/s={} rps={} created={created} errors={errors} p95={}",
                u.vus,
                format_elapsed(u.elapsed),
                format_rate(iters_per_sec),
                format_rate(rps),
                format_ms(p95),
            );
            progress.update(u.duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        let violations: Vec<_> = report.thresholds.violations().collect();
        if !violations.is_empty() {
            eprintln!("thresholds failed:");
            for v in violations {
                match v.observed {
                    Some(obs) => eprintln!(
                        "  {}: {} (observed {obs:.3})",
                        v.display_name(),
                        v.expression
                    ),
                    None => eprintln!("  {}: {} (no data)", v.display_name(), v.expression),
                }
            }
        }

        Ok(())
    }
}
