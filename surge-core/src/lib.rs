mod config;
mod engine;
mod error;
mod executor;
mod gate;
mod iteration_metrics;
mod payload;
mod progress;
mod report;
mod request_metrics;
mod run;
mod scenario;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use config::{
    DEFAULT_BASE_URL, DEFAULT_BRANCH_OFFICE, DEFAULT_DURATION, DEFAULT_LATENCY_CEILING,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_VUS, IterationPause, RunConfig, RunOptions, TICKETS_PATH,
    Target,
};
pub use engine::{SpikeTest, run_spike};
pub use error::{Error, Result};
pub use executor::{OutcomeClass, RequestExecutor, RequestOutcome, Transport, TransportError};
pub use gate::IterationGate;
pub use iteration_metrics::IterationMetricIds;
pub use payload::{PayloadGenerator, QueueType, TicketPayload};
pub use progress::{ProgressFn, ProgressUpdate};
pub use report::{ConfigSummary, RunReport};
pub use request_metrics::RequestMetricIds;
pub use run::{SchedulerReport, StopReason, run_vus};
pub use scenario::{CHECK_STATUS, ScenarioMetricIds, TicketScenario, latency_check_name};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdRule, ThresholdSet, compile_thresholds,
    default_spike_thresholds, parse_threshold_expr,
};
pub use thresholds_eval::{RuleResult, ThresholdReport, evaluate};
pub use vu::{Iteration, StartSignal, VuState};

pub use surge_metrics as metrics;
