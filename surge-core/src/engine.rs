use std::sync::Arc;

use surge_metrics::Registry;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::{RunConfig, RunOptions};
use crate::executor::{RequestExecutor, Transport};
use crate::progress::ProgressFn;
use crate::report::{ConfigSummary, RunReport};
use crate::run::run_vus;
use crate::scenario::{ScenarioMetricIds, TicketScenario};
use crate::thresholds_eval::evaluate;

/// A validated spike run, ready to execute.
#[derive(Debug)]
pub struct SpikeTest {
    config: RunConfig,
    metrics: Arc<Registry>,
}

impl SpikeTest {
    /// Registers the run's metrics and validates `opts` against them.
    pub fn new(opts: RunOptions) -> Result<Self> {
        let metrics = Arc::new(Registry::default());
        ScenarioMetricIds::register(&metrics);
        let config = opts.into_config(&metrics)?;
        Ok(Self { config, metrics })
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<Registry> {
        &self.metrics
    }

    pub async fn run<T: Transport>(
        self,
        transport: Arc<T>,
        cancel: CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<RunReport> {
        let Self { config, metrics } = self;

        let executor = RequestExecutor::new(
            transport,
            config.target.url(),
            config.request_timeout,
            config.latency_ceiling,
        );
        let scenario = Arc::new(TicketScenario::new(
            executor,
            metrics.clone(),
            config.latency_ceiling,
            config.branch_office.as_str(),
        ));

        let scheduler = run_vus(&config, scenario, metrics.clone(), cancel, progress).await?;

        let snapshot = metrics.snapshot(scheduler.elapsed);
        let thresholds = evaluate(&snapshot, &config.thresholds);
        tracing::info!(
            passed = thresholds.passed,
            violations = thresholds.violations().count(),
            "thresholds evaluated"
        );

        Ok(RunReport {
            config: ConfigSummary::from(&config),
            scheduler,
            metrics: snapshot,
            thresholds,
        })
    }
}

/// Validates `opts`, runs the spike against `transport`, and evaluates thresholds.
pub async fn run_spike<T: Transport>(
    opts: RunOptions,
    transport: T,
    cancel: CancellationToken,
) -> Result<RunReport> {
    SpikeTest::new(opts)?
        .run(Arc::new(transport), cancel, None)
        .await
}
