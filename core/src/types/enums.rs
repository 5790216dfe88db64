use std::fmt;

/// Report sentinel for a study with no written images
pub const IMAGES_NOT_FOUND: &str = "Not found";

/// Report sentinel for a diagnosis code with no reference entry
pub const DESCRIPTION_NOT_FOUND: &str = "Description not found";

/// Terminal state of a run
///
/// A cancelled run is distinct from one that finished with skipped items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
#[cfg_attr(feature = "json", serde(rename_all = "kebab-case"))]
pub enum RunOutcome {
    /// Every item processed without a skip
    Completed,

    /// Run finished; at least one image, row or schema step was skipped
    CompletedWithSkips,

    /// Cancel token fired before the run finished
    Cancelled,
}

impl RunOutcome {
    /// Returns simple name for display
    pub fn simple_name(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::CompletedWithSkips => "completed-with-skips",
            RunOutcome::Cancelled => "cancelled",
        }
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::CompletedWithSkips => 2,
            RunOutcome::Cancelled => 3,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        assert_eq!(RunOutcome::Completed.exit_code(), 0);
        assert_ne!(
            RunOutcome::CompletedWithSkips.exit_code(),
            RunOutcome::Cancelled.exit_code()
        );
        assert_eq!(RunOutcome::Cancelled.to_string(), "cancelled");
    }
}
