use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Releases every VU at once after all of them finished initialization.
#[derive(Debug)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.started.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

impl Default for StartSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of one virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VuState {
    Idle,
    Running,
    /// Deadline passed; no new iteration will start.
    Stopping,
    /// The run was cancelled; the in-flight iteration was dropped.
    Cancelled,
    Done,
}

/// One unit of work a VU repeats until the run ends.
///
/// `init` runs before the clock starts. A failed iteration is recorded by the implementation
/// and never stops the VU.
pub trait Iteration: Send + Sync + 'static {
    type State: Send + 'static;

    fn init(&self, vu_id: u64) -> Self::State;

    fn run(&self, state: &mut Self::State) -> impl Future<Output = ()> + Send;
}
