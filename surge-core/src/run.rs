use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Serialize, Serializer};
use surge_metrics::Registry;
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{IterationPause, RunConfig};
use crate::gate::IterationGate;
use crate::iteration_metrics::IterationMetricIds;
use crate::progress::{ProgressFn, ProgressUpdate};
use crate::vu::{Iteration, StartSignal, VuState};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every VU finished its last iteration after the deadline.
    Completed,
    /// Stragglers were interrupted once the graceful stop window ran out.
    DrainTimeout,
    /// The caller's token was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerReport {
    #[serde(skip)]
    pub started: Instant,
    #[serde(skip)]
    pub finished: Instant,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub vus: u64,
    pub completed_iterations: u64,
    pub interrupted_iterations: u64,
    pub stop_reason: StopReason,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

struct RunShared<I> {
    iteration: Arc<I>,
    metrics: Arc<Registry>,
    ids: IterationMetricIds,
    gate: IterationGate,
    pause: IterationPause,
    ready: Barrier,
    start: StartSignal,
    cancel: CancellationToken,
}

#[derive(Debug, Default, Clone, Copy)]
struct VuTally {
    completed: u64,
    interrupted: u64,
    init_panicked: Option<u64>,
}

/// Runs `config.vus` virtual users, each repeating `iteration` until the deadline.
///
/// Returns once every VU has exited. VUs still busy `graceful_stop` after the deadline, and
/// all VUs once `cancel` fires, have their in-flight iteration dropped.
pub async fn run_vus<I: Iteration>(
    config: &RunConfig,
    iteration: Arc<I>,
    metrics: Arc<Registry>,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
) -> Result<SchedulerReport> {
    let ids = IterationMetricIds::register(&metrics);
    // Drain timeouts cancel only this run, never the caller's token.
    let run_token = cancel.child_token();

    let vus = config.vus;
    let n_vus = usize::try_from(vus).unwrap_or(usize::MAX);
    let shared = Arc::new(RunShared {
        iteration,
        metrics: metrics.clone(),
        ids,
        gate: IterationGate::new(config.duration),
        pause: config.pause,
        ready: Barrier::new(n_vus.saturating_add(1)),
        start: StartSignal::new(),
        cancel: run_token.clone(),
    });

    let mut handles = Vec::with_capacity(n_vus);
    for vu_id in 1..=vus {
        handles.push(tokio::spawn(vu_loop(vu_id, shared.clone())));
    }

    // Keep per-VU setup out of the measured window.
    let released = tokio::select! {
        biased;
        () = run_token.cancelled() => false,
        _ = shared.ready.wait() => true,
    };
    if !released {
        let (tally, join_error) = join_vus(handles, &run_token).await;
        let now = Instant::now();
        return finish(vus, tally, join_error, now, now, StopReason::Cancelled);
    }

    let started = Instant::now();
    shared.gate.start_at(started);
    shared.start.start();
    info!(
        vus,
        duration = %humantime::format_duration(config.duration),
        pause = %config.pause,
        target = %config.target.url(),
        "run started"
    );

    let drain_at = started + config.duration + config.graceful_stop;
    let drain = tokio::spawn({
        let token = run_token.clone();
        let graceful_stop = config.graceful_stop;
        async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(drain_at) => {
                    warn!(
                        graceful_stop = %humantime::format_duration(graceful_stop),
                        "graceful stop elapsed; interrupting in-flight iterations"
                    );
                    token.cancel();
                }
            }
        }
    });

    let progress_handle =
        progress.map(|progress| spawn_progress(progress, metrics, started, config.duration, vus));

    let (tally, join_error) = join_vus(handles, &run_token).await;
    let finished = Instant::now();

    let stop_reason = if cancel.is_cancelled() {
        StopReason::Cancelled
    } else if run_token.is_cancelled() {
        StopReason::DrainTimeout
    } else {
        StopReason::Completed
    };

    drain.abort();
    let _ = drain.await;
    if let Some(h) = progress_handle {
        h.abort();
        let _ = h.await;
    }

    finish(vus, tally, join_error, started, finished, stop_reason)
}

async fn join_vus(
    handles: Vec<JoinHandle<VuTally>>,
    run_token: &CancellationToken,
) -> (VuTally, Option<tokio::task::JoinError>) {
    let mut tally = VuTally::default();
    let mut join_error = None;
    for h in handles {
        match h.await {
            Ok(t) => {
                tally.completed = tally.completed.saturating_add(t.completed);
                tally.interrupted = tally.interrupted.saturating_add(t.interrupted);
                tally.init_panicked = tally.init_panicked.or(t.init_panicked);
            }
            Err(err) => {
                // Stop the remaining VUs instead of leaving them detached.
                run_token.cancel();
                join_error.get_or_insert(err);
            }
        }
    }
    (tally, join_error)
}

fn finish(
    vus: u64,
    tally: VuTally,
    join_error: Option<tokio::task::JoinError>,
    started: Instant,
    finished: Instant,
    stop_reason: StopReason,
) -> Result<SchedulerReport> {
    if let Some(vu_id) = tally.init_panicked {
        return Err(Error::VuInitPanicked { vu_id });
    }
    if let Some(err) = join_error {
        return Err(Error::Join(err));
    }

    let elapsed = finished.duration_since(started);
    info!(
        completed = tally.completed,
        interrupted = tally.interrupted,
        elapsed = %humantime::format_duration(elapsed),
        %stop_reason,
        "run finished"
    );

    Ok(SchedulerReport {
        started,
        finished,
        elapsed,
        vus,
        completed_iterations: tally.completed,
        interrupted_iterations: tally.interrupted,
        stop_reason,
    })
}

async fn vu_loop<I: Iteration>(vu_id: u64, shared: Arc<RunShared<I>>) -> VuTally {
    let mut tally = VuTally::default();
    let init = std::panic::catch_unwind(AssertUnwindSafe(|| shared.iteration.init(vu_id)));
    let Ok(mut state) = init else {
        error!(vu_id, "vu init panicked; stopping the run");
        tally.init_panicked = Some(vu_id);
        shared.cancel.cancel();
        return tally;
    };
    debug!(vu_id, state = %VuState::Idle, "vu ready");

    tokio::select! {
        biased;
        () = shared.cancel.cancelled() => {
            debug!(vu_id, state = %VuState::Cancelled, "cancelled during setup");
            return tally;
        }
        _ = shared.ready.wait() => {}
    }
    tokio::select! {
        biased;
        () = shared.cancel.cancelled() => {
            debug!(vu_id, state = %VuState::Cancelled, "cancelled before start");
            return tally;
        }
        () = shared.start.wait() => {}
    }
    debug!(vu_id, state = %VuState::Running, "vu started");

    let mut pause_rng = (!shared.pause.is_none()).then(SmallRng::from_entropy);

    let end_state = loop {
        if shared.cancel.is_cancelled() {
            break VuState::Cancelled;
        }
        if !shared.gate.next() {
            break VuState::Stopping;
        }

        let iteration_started = Instant::now();
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => {
                tally.interrupted = tally.interrupted.saturating_add(1);
                shared.ids.record_interrupted(&shared.metrics);
                break VuState::Cancelled;
            }
            () = shared.iteration.run(&mut state) => {
                tally.completed = tally.completed.saturating_add(1);
                shared
                    .ids
                    .record_iteration(&shared.metrics, iteration_started.elapsed());
            }
        }

        match pause_rng.as_mut() {
            Some(rng) => {
                let pause = shared.pause.sample(rng).min(shared.gate.remaining());
                if !pause.is_zero() {
                    tokio::select! {
                        biased;
                        () = shared.cancel.cancelled() => break VuState::Cancelled,
                        () = tokio::time::sleep(pause) => {}
                    }
                }
            }
            // Back-to-back iterations that never wait must not starve VUs sharing a worker.
            None => tokio::task::yield_now().await,
        }
    };

    debug!(vu_id, state = %end_state, completed = tally.completed, "vu stopping");
    debug!(vu_id, state = %VuState::Done, "vu exited");
    tally
}

fn spawn_progress(
    progress: ProgressFn,
    metrics: Arc<Registry>,
    started: Instant,
    duration: Duration,
    vus: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick is immediate; the first update should cover a full interval.
        interval.tick().await;

        let mut tick: u64 = 0;
        let mut last_at = Instant::now();
        loop {
            interval.tick().await;

            tick = tick.saturating_add(1);
            let now = Instant::now();
            let dt = now.duration_since(last_at);
            last_at = now;
            let elapsed = now.duration_since(started);

            (progress)(ProgressUpdate {
                tick,
                interval: dt,
                elapsed,
                duration,
                vus,
                snapshot: metrics.snapshot(elapsed),
            });
        }
    })
}
