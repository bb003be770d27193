use serde::{Deserialize, Serialize};

/// Why the dispatcher gave up on a subtask (§4.C, §7). Shared vocabulary:
/// it appears both in `weft-core`'s `DispatcherError::Aborted` and in the
/// persisted `Subtask::error_message` surface, so it lives here rather
/// than in the dispatcher crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchCause {
    Transport,
    Validation,
    ToolRunner,
    AgentMissing,
    Cancelled,
}

impl DispatchCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchCause::Transport => "transport",
            DispatchCause::Validation => "validation",
            DispatchCause::ToolRunner => "tool_runner",
            DispatchCause::AgentMissing => "agent_missing",
            DispatchCause::Cancelled => "cancelled",
        }
    }

    /// §8 boundary behavior: cancellation and agent-missing failures are
    /// not eligible for retry, everything else is.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DispatchCause::Cancelled | DispatchCause::AgentMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_and_agent_missing_are_not_retryable() {
        assert!(!DispatchCause::Cancelled.is_retryable());
        assert!(!DispatchCause::AgentMissing.is_retryable());
    }

    #[test]
    fn transport_and_tool_runner_are_retryable() {
        assert!(DispatchCause::Transport.is_retryable());
        assert!(DispatchCause::ToolRunner.is_retryable());
        assert!(DispatchCause::Validation.is_retryable());
    }
}
