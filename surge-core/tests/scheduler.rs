use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use surge_core::metrics::Registry;
use surge_core::{
    Error, Iteration, IterationPause, RunConfig, RunOptions, SchedulerReport, StopReason, run_vus,
};
use tokio_util::sync::CancellationToken;

/// Iteration that waits a fixed time and counts runs.
struct Sleepy {
    delay: Duration,
    runs: AtomicU64,
}

impl Sleepy {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            runs: AtomicU64::new(0),
        })
    }
}

impl Iteration for Sleepy {
    type State = ();

    fn init(&self, _vu_id: u64) {}

    async fn run(&self, _state: &mut ()) {
        tokio::time::sleep(self.delay).await;
        self.runs.fetch_add(1, Ordering::Relaxed);
    }
}

/// Iteration that completes without ever yielding.
struct Spin;

impl Iteration for Spin {
    type State = u64;

    fn init(&self, vu_id: u64) -> u64 {
        vu_id
    }

    async fn run(&self, state: &mut u64) {
        *state = state.wrapping_add(1);
    }
}

/// Iteration whose setup panics for one VU.
struct BrokenSetup {
    vu_id: u64,
}

impl Iteration for BrokenSetup {
    type State = ();

    fn init(&self, vu_id: u64) {
        assert_ne!(vu_id, self.vu_id, "setup failed");
    }

    async fn run(&self, _state: &mut ()) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn config(vus: u64, duration: Duration, graceful_stop: Duration) -> RunConfig {
    RunOptions {
        vus: Some(vus),
        duration: Some(duration),
        graceful_stop: Some(graceful_stop),
        thresholds: Some(Vec::new()),
        ..RunOptions::default()
    }
    .into_config(&Registry::default())
    .unwrap_or_else(|e| panic!("{e}"))
}

async fn run<I: Iteration>(cfg: &RunConfig, it: Arc<I>) -> (SchedulerReport, Arc<Registry>) {
    let metrics = Arc::new(Registry::default());
    let report = run_vus(cfg, it, metrics.clone(), CancellationToken::new(), None)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    (report, metrics)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn iteration_count_grows_with_vus_and_duration() {
    let step = Duration::from_millis(2);
    let grace = Duration::from_secs(1);

    let (one_vu, _) = run(&config(1, Duration::from_millis(300), grace), Sleepy::new(step)).await;
    let (eight_vus, _) =
        run(&config(8, Duration::from_millis(300), grace), Sleepy::new(step)).await;
    assert!(
        eight_vus.completed_iterations >= one_vu.completed_iterations,
        "1 vu: {}, 8 vus: {}",
        one_vu.completed_iterations,
        eight_vus.completed_iterations
    );

    let (short, _) = run(&config(2, Duration::from_millis(150), grace), Sleepy::new(step)).await;
    let (long, _) = run(&config(2, Duration::from_millis(450), grace), Sleepy::new(step)).await;
    assert!(
        long.completed_iterations >= short.completed_iterations,
        "150ms: {}, 450ms: {}",
        short.completed_iterations,
        long.completed_iterations
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_ends_within_duration_plus_one_iteration() {
    let duration = Duration::from_millis(300);
    let iteration = Duration::from_millis(50);

    let it = Sleepy::new(iteration);
    let (report, metrics) = run(&config(10, duration, Duration::from_secs(5)), it.clone()).await;

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.interrupted_iterations, 0);
    assert!(report.elapsed >= duration);
    // Scheduling slack on a loaded machine.
    assert!(
        report.elapsed <= duration + iteration + Duration::from_millis(200),
        "elapsed={:?}",
        report.elapsed
    );

    let snap = metrics.snapshot(report.elapsed);
    assert_eq!(snap.counter("iterations"), Some(report.completed_iterations));
    assert_eq!(it.runs.load(Ordering::Relaxed), report.completed_iterations);
    assert_eq!(
        snap.trend("iteration_duration").map(|t| t.count()),
        Some(report.completed_iterations)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn instant_iterations_do_not_starve_other_vus() {
    let (report, _) = run(
        &config(8, Duration::from_millis(200), Duration::from_secs(1)),
        Arc::new(Spin),
    )
    .await;

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert!(report.completed_iterations > 8);
    assert!(report.elapsed < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hung_iterations_are_interrupted_after_graceful_stop() {
    let cfg = config(5, Duration::from_millis(100), Duration::from_millis(100));
    let (report, metrics) = run(&cfg, Sleepy::new(Duration::from_secs(3_600))).await;

    assert_eq!(report.stop_reason, StopReason::DrainTimeout);
    assert_eq!(report.completed_iterations, 0);
    assert_eq!(report.interrupted_iterations, 5);
    assert!(report.elapsed < Duration::from_secs(2), "elapsed={:?}", report.elapsed);

    let snap = metrics.snapshot(report.elapsed);
    assert_eq!(snap.counter("iterations_interrupted"), Some(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_the_run_early() {
    let cfg = config(4, Duration::from_secs(60), Duration::from_secs(60));
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        }
    });

    let metrics = Arc::new(Registry::default());
    let report = run_vus(
        &cfg,
        Sleepy::new(Duration::from_secs(3_600)),
        metrics,
        cancel,
        None,
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.interrupted_iterations, 4);
    assert!(report.elapsed < Duration::from_secs(2), "elapsed={:?}", report.elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pauses_are_clipped_to_the_window() {
    let mut cfg = config(2, Duration::from_millis(200), Duration::from_secs(5));
    cfg.pause = IterationPause::Fixed(Duration::from_secs(30));

    let (report, _) = run(&cfg, Sleepy::new(Duration::from_millis(1))).await;
    assert_eq!(report.stop_reason, StopReason::Completed);
    // One iteration each, then the pause runs out with the window.
    assert_eq!(report.completed_iterations, 2);
    assert!(report.elapsed < Duration::from_secs(1), "elapsed={:?}", report.elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_is_reported_every_second() {
    let cfg = config(2, Duration::from_millis(2_300), Duration::from_secs(1));
    let ticks = Arc::new(AtomicU64::new(0));

    let progress: surge_core::ProgressFn = Arc::new({
        let ticks = ticks.clone();
        move |update| {
            assert_eq!(update.vus, 2);
            assert!(update.completion() <= 1.0);
            ticks.fetch_add(1, Ordering::Relaxed);
        }
    });

    let metrics = Arc::new(Registry::default());
    run_vus(
        &cfg,
        Sleepy::new(Duration::from_millis(10)),
        metrics,
        CancellationToken::new(),
        Some(progress),
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(ticks.load(Ordering::Relaxed), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uniform_pauses_space_out_iterations() {
    let duration = Duration::from_millis(300);
    let mut cfg = config(2, duration, Duration::from_secs(5));
    cfg.pause = IterationPause::Uniform {
        min: Duration::from_millis(20),
        max: Duration::from_millis(40),
    };

    let (report, _) = run(&cfg, Sleepy::new(Duration::from_millis(1))).await;
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.interrupted_iterations, 0);
    // Each VU sleeps 20..=40ms between iterations: at most 16 and at least a handful fit.
    assert!(
        (8..=32).contains(&report.completed_iterations),
        "completed={}",
        report.completed_iterations
    );
    assert!(report.elapsed >= duration);
    assert!(
        report.elapsed <= duration + Duration::from_millis(250),
        "elapsed={:?}",
        report.elapsed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_setup_fails_the_run_instead_of_hanging() {
    let cfg = config(3, Duration::from_millis(200), Duration::from_secs(1));
    let cancel = CancellationToken::new();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_vus(
            &cfg,
            Arc::new(BrokenSetup { vu_id: 2 }),
            Arc::new(Registry::default()),
            cancel.clone(),
            None,
        ),
    )
    .await
    .unwrap_or_else(|_| panic!("run_vus hung after a setup panic"));

    assert!(
        matches!(result, Err(Error::VuInitPanicked { vu_id: 2 })),
        "{result:?}"
    );
    assert!(!cancel.is_cancelled(), "caller token must stay untouched");
}
