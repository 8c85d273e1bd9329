use std::sync::Arc;

use surge_core::{RunOptions, SpikeTest, StopReason};
use surge_http::HttpClient;
use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;
use crate::config_file;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let file = match &args.config {
        Some(path) => config_file::load(path)
            .await
            .map_err(RunError::InvalidInput)?,
        None => RunOptions::default(),
    };
    let mut opts = file.merge(args.options());
    if args.no_thresholds {
        opts.thresholds = Some(Vec::new());
    }

    let test =
        SpikeTest::new(opts).map_err(|err| RunError::from_core("invalid run options", err))?;
    out.print_header(test.config());

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let report = test
        .run(Arc::new(HttpClient::default()), cancel, out.progress())
        .await
        .map_err(|err| RunError::from_core("spike run failed", err));
    interrupt.abort();
    let report = report?;

    if report.scheduler.stop_reason == StopReason::Cancelled {
        tracing::warn!("run was interrupted; metrics cover the partial run");
    }

    out.print_summary(&report).map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_verdict(report.passed()))
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("interrupt received; stopping virtual users");
            cancel.cancel();
        }
        Err(err) => tracing::warn!(error = %err, "ctrl-c handler unavailable"),
    }
}
