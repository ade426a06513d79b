//! Exit-code mapping.

use sitescope_types::EngineError;

/// Process exit codes, stable for scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// Bad arguments, config or illegal transition.
    Usage = 2,
    /// Unknown project, snapshot, plugin or issue.
    NotFound = 3,
    /// Analyzers produced findings (a fail-status result).
    Findings = 4,
    /// Internal, resource or network failure.
    Internal = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_error(err: &EngineError) -> Self {
        match err.kind() {
            "usage" | "invalid_config" | "invalid_transition" => Self::Usage,
            "not_found" => Self::NotFound,
            _ => Self::Internal,
        }
    }
}
