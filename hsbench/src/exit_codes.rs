#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Report written. Also used when the benchmark itself failed internally; that failure is in
    /// the report.
    Success = 0,

    /// Profile/config could not be loaded or validated, or the report could not be written.
    Failure = 1,

    /// Invalid CLI usage (unknown flags, malformed values).
    Usage = 2,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
