use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use surge_core::{IterationPause, RunOptions, ThresholdSet};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_pause(input: &str) -> Result<IterationPause, String> {
    input.parse::<IterationPause>().map_err(|err| err.to_string())
}

/// `METRIC:EXPR`, e.g. `http_req_duration:p(95)<3000`.
fn parse_threshold(input: &str) -> Result<(String, String), String> {
    let (metric, expr) = input
        .split_once(':')
        .ok_or_else(|| format!("invalid threshold '{input}' (expected METRIC:EXPR)"))?;
    let (metric, expr) = (metric.trim(), expr.trim());
    if metric.is_empty() || expr.is_empty() {
        return Err(format!("invalid threshold '{input}' (expected METRIC:EXPR)"));
    }
    Ok((metric.to_string(), expr.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar and human-readable summary.
    #[value(name = "human")]
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final report to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Spike load test for a ticket-creation endpoint",
    long_about = "surge drives a burst of concurrent virtual users against POST /api/tickets, records request, outcome and latency metrics, and checks them against pass/fail thresholds.\n\nParameters come from CLI flags, then an optional YAML config file, then the built-in spike profile (50 VUs for 10s, no pause).",
    after_help = "Examples:\n  surge run\n  surge run --base-url http://localhost:8080 --vus 100 --duration 30s\n  surge run --config spike.yaml --threshold 'tickets_created:count>100'\n  surge run --pause 100ms..500ms --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a spike test
    #[command(
        long_about = "Run a spike test against the ticket endpoint.\n\nCLI flags override values from the config file; `--threshold` replaces the file's rules for the same metric.\n\nExit codes: 0 passed, 11 thresholds failed, 30 invalid input, 40 runtime error."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// YAML config file
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the system under test
    #[arg(long, env = "BASE_URL", value_name = "URL")]
    pub base_url: Option<String>,

    /// Number of virtual users
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Pause between iterations: `none`, a duration, or a range like `100ms..1s`
    #[arg(long, value_parser = parse_pause)]
    pub pause: Option<IterationPause>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Latency above which the response-time check fails
    #[arg(long, value_parser = parse_duration)]
    pub latency_ceiling: Option<Duration>,

    /// How long in-flight iterations may run past the deadline (defaults to the request timeout)
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// `branchOffice` sent in every ticket
    #[arg(long)]
    pub branch_office: Option<String>,

    /// Add a threshold (repeatable, METRIC:EXPR)
    #[arg(long = "threshold", value_name = "METRIC:EXPR", value_parser = parse_threshold)]
    pub thresholds: Vec<(String, String)>,

    /// Run without any thresholds
    #[arg(long, conflicts_with = "thresholds")]
    pub no_thresholds: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

impl RunArgs {
    /// Flag values as the top layer of run options. Repeated thresholds for one metric merge.
    pub fn options(&self) -> RunOptions {
        let thresholds = if self.no_thresholds {
            Some(Vec::new())
        } else if self.thresholds.is_empty() {
            None
        } else {
            let mut sets: Vec<ThresholdSet> = Vec::new();
            for (metric, expr) in &self.thresholds {
                match sets.iter_mut().find(|s| &s.metric == metric) {
                    Some(set) => set.expressions.push(expr.clone()),
                    None => sets.push(ThresholdSet::new(metric.clone(), [expr.clone()])),
                }
            }
            Some(sets)
        };

        RunOptions {
            base_url: self.base_url.clone(),
            vus: self.vus,
            duration: self.duration,
            pause: self.pause,
            request_timeout: self.timeout,
            latency_ceiling: self.latency_ceiling,
            graceful_stop: self.graceful_stop,
            branch_office: self.branch_office.clone(),
            thresholds,
        }
    }
}
