use std::sync::OnceLock;
use std::time::Duration;

use tokio::time::Instant;

/// Shared stop condition: admits iterations until the run deadline passes.
#[derive(Debug)]
pub struct IterationGate {
    duration: Duration,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: OnceLock::new(),
        }
    }

    /// Fixes the deadline. Only the first call has an effect.
    pub fn start_at(&self, started: Instant) {
        let _ = self.deadline.set(started + self.duration);
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    /// Whether another iteration may start now.
    pub fn next(&self) -> bool {
        let now = Instant::now();

        // Lazily start the clock if the scheduler did not.
        if self.deadline.get().is_none() {
            self.start_at(now);
        }

        self.deadline.get().is_some_and(|deadline| now < *deadline)
    }

    /// Time left until the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline()
            .map_or(self.duration, |d| d.saturating_duration_since(Instant::now()))
    }
}
