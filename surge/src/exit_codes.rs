#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, failed VU tasks).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}
