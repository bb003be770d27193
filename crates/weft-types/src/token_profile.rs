use serde::{Deserialize, Serialize};

/// Seven integer budgets; one preset is active at a time, set atomically
/// (§3, §9 process-wide state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenProfile {
    pub planner: u32,
    pub subtask_executor: u32,
    pub merger: u32,
    pub tool_creation: u32,
    pub error_correction: u32,
    pub self_improvement: u32,
    pub chat: u32,
}

impl TokenProfile {
    /// Known presets, analogous to the teacher's budget defaults
    /// (`OrchestratorConfig::default`'s generous-but-bounded caps).
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "frugal" => Some(Self {
                planner: 2_000,
                subtask_executor: 2_000,
                merger: 2_000,
                tool_creation: 1_000,
                error_correction: 1_000,
                self_improvement: 1_000,
                chat: 2_000,
            }),
            "generous" => Some(Self {
                planner: 16_000,
                subtask_executor: 16_000,
                merger: 16_000,
                tool_creation: 8_000,
                error_correction: 8_000,
                self_improvement: 8_000,
                chat: 16_000,
            }),
            _ => None,
        }
    }
}

impl Default for TokenProfile {
    fn default() -> Self {
        Self {
            planner: 6_000,
            subtask_executor: 6_000,
            merger: 6_000,
            tool_creation: 3_000,
            error_correction: 3_000,
            self_improvement: 3_000,
            chat: 6_000,
        }
    }
}
