use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry, TagSet};
use tokio::time::Instant;

use crate::executor::{OutcomeClass, RequestExecutor, RequestOutcome, Transport};
use crate::iteration_metrics::IterationMetricIds;
use crate::payload::PayloadGenerator;
use crate::request_metrics::RequestMetricIds;
use crate::vu::Iteration;

pub const CHECK_STATUS: &str = "status is 201 or 500";

/// Every metric a spike run records. Registered before thresholds are compiled.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioMetricIds {
    pub request: RequestMetricIds,
    pub iteration: IterationMetricIds,
    pub checks: MetricId,
    pub tickets_created: MetricId,
    pub tickets_degraded: MetricId,
    pub ticket_errors: MetricId,
    pub create_latency: MetricId,
}

impl ScenarioMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            request: RequestMetricIds::register(metrics),
            iteration: IterationMetricIds::register(metrics),
            checks: metrics.register("checks", MetricKind::Rate),
            tickets_created: metrics.register("tickets_created", MetricKind::Counter),
            tickets_degraded: metrics.register("tickets_degraded", MetricKind::Counter),
            ticket_errors: metrics.register("ticket_errors", MetricKind::Rate),
            create_latency: metrics.register_time_trend("create_latency"),
        }
    }
}

/// Name of the latency check for a given ceiling, e.g. `response time < 5s`.
#[must_use]
pub fn latency_check_name(ceiling: Duration) -> String {
    format!("response time < {}", humantime::format_duration(ceiling))
}

/// One ticket creation per iteration: generate, post, record.
pub struct TicketScenario<T> {
    executor: RequestExecutor<T>,
    metrics: Arc<Registry>,
    ids: ScenarioMetricIds,
    branch_office: Arc<str>,
    untagged: TagSet,
    status_check: TagSet,
    latency_check: TagSet,
}

impl<T: Transport> TicketScenario<T> {
    pub fn new(
        executor: RequestExecutor<T>,
        metrics: Arc<Registry>,
        latency_ceiling: Duration,
        branch_office: impl Into<Arc<str>>,
    ) -> Self {
        let ids = ScenarioMetricIds::register(&metrics);
        let latency_check_name = latency_check_name(latency_ceiling);
        let status_check = metrics.resolve_tags(&[("check", CHECK_STATUS)]);
        let latency_check = metrics.resolve_tags(&[("check", latency_check_name.as_str())]);

        Self {
            executor,
            metrics,
            ids,
            branch_office: branch_office.into(),
            untagged: TagSet::default(),
            status_check,
            latency_check,
        }
    }

    #[must_use]
    pub fn ids(&self) -> ScenarioMetricIds {
        self.ids
    }

    fn record(&self, outcome: &RequestOutcome, create_latency: Duration) {
        let m = &*self.metrics;
        self.ids.request.record_outcome(m, outcome);
        m.record_duration(self.ids.create_latency, &self.untagged, create_latency);

        match outcome.class {
            OutcomeClass::Success => m.increment_counter(self.ids.tickets_created, &self.untagged),
            OutcomeClass::ExpectedFailure => {
                m.increment_counter(self.ids.tickets_degraded, &self.untagged);
            }
            OutcomeClass::UnexpectedFailure => {}
        }
        m.record_rate(
            self.ids.ticket_errors,
            &self.untagged,
            outcome.class == OutcomeClass::UnexpectedFailure,
        );

        m.record_rate(
            self.ids.checks,
            &self.status_check,
            matches!(outcome.status, Some(201 | 500)),
        );
        m.record_rate(self.ids.checks, &self.latency_check, !outcome.slow);

        if outcome.class == OutcomeClass::UnexpectedFailure {
            tracing::trace!(
                status = ?outcome.status,
                error_kind = ?outcome.error_kind,
                "ticket creation failed"
            );
        }
    }
}

impl<T: Transport> Iteration for TicketScenario<T> {
    type State = PayloadGenerator;

    fn init(&self, _vu_id: u64) -> Self::State {
        PayloadGenerator::new(self.branch_office.clone())
    }

    async fn run(&self, state: &mut Self::State) {
        let payload = state.generate();
        let started = Instant::now();
        let outcome = self.executor.execute(&payload).await;
        self.record(&outcome, started.elapsed());
    }
}
