use std::fmt;

/// Public lifecycle state of a step within a run.
///
/// Every step starts as `Skipped` and only leaves that state once the
/// scheduler decides it is runnable. A step that is never reached (because
/// its branch failed or the run was aborted) is reported as `Skipped`.
/// Retries stay `InProgress`; the attempt count is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStatus {
    Skipped,
    InProgress,
    Successful,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Skipped => "Skipped",
            StepStatus::InProgress => "InProgress",
            StepStatus::Successful => "Successful",
            StepStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// What a failing step with `ignore_errors = true` does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreErrorsPolicy {
    /// Record `Failed`, do not abort, and keep going into the step's children.
    ContinueBranch,
    /// Record `Failed` and abort the run exactly like any other failure.
    Abort,
}

impl Default for IgnoreErrorsPolicy {
    fn default() -> Self {
        IgnoreErrorsPolicy::ContinueBranch
    }
}
