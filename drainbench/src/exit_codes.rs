#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Invalid flags or environment (bad integers, empty workload list, unknown mode, ...).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unreachable target, malformed report).
    RuntimeError = 40,

    /// A reset/seed/dispatch/report request returned an error status.
    ControlRequestFailed = 41,

    /// The target never drained within the configured timeout.
    PollTimeout = 42,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
