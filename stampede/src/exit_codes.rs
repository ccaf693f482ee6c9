#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// Invalid CLI/plan input (bad flags, invalid durations, invalid threshold syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants, panics caught at top-level).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// The process exit status mirrors the threshold verdict alone; check
    /// failures show up in the report but don't fail the process.
    #[must_use]
    pub fn from_verdict(thresholds_passed: bool) -> Self {
        if thresholds_passed {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_maps_to_exit_codes() {
        assert_eq!(ExitCode::from_verdict(true), ExitCode::Success);
        assert_eq!(ExitCode::from_verdict(false), ExitCode::ThresholdsFailed);
        assert_eq!(ExitCode::ThresholdsFailed.as_i32(), 11);
    }
}
