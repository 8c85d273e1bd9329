use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Single bar tracking elapsed time against the planned duration.
pub(crate) struct HumanProgress {
    pb: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(5));
        pb.set_style(bar_style());
        pb.set_prefix("spike");
        Self { pb }
    }

    pub(crate) fn update(&self, duration: Duration, elapsed: Duration, message: String) {
        let total_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.pb.set_length(total_ms);
        self.pb.set_position(elapsed_ms.min(total_ms));
        self.pb.set_message(message);
    }

    pub(crate) fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
