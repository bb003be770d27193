use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed whitelist shared with the dispatcher (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSelector {
    LlmOnly,
    AgenticTool,
    Subprocess,
}

impl EngineSelector {
    pub const ALL: [EngineSelector; 3] = [
        EngineSelector::LlmOnly,
        EngineSelector::AgenticTool,
        EngineSelector::Subprocess,
    ];

    /// Validates an untyped string from raw planner JSON against the
    /// whitelist, returning the offending value on failure rather than a
    /// generic deserialization error.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "llm-only" => Ok(EngineSelector::LlmOnly),
            "agentic-tool" => Ok(EngineSelector::AgenticTool),
            "subprocess" => Ok(EngineSelector::Subprocess),
            other => Err(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineSelector::LlmOnly => "llm-only",
            EngineSelector::AgenticTool => "agentic-tool",
            EngineSelector::Subprocess => "subprocess",
        }
    }
}

/// `pending -> running -> (completed | failed)`. No backward transition,
/// no terminal state other than the two listed (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SubtaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskStatus::Completed | SubtaskStatus::Failed)
    }

    /// Enforces invariant 1 of §8: monotonic forward progress only.
    pub fn can_transition_to(&self, next: SubtaskStatus) -> bool {
        use SubtaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSlot {
    pub status: SubtaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_record_path: Option<PathBuf>,
}

impl Default for ResultSlot {
    fn default() -> Self {
        Self {
            status: SubtaskStatus::Pending,
            memory_record_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub objective: String,
    pub target_agent: String,
    pub engine: EngineSelector,
    pub parallel_group: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_allow_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
    /// Planner hints the Tool Runner MAY ignore (§9 open question decision).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_notes: Option<serde_json::Value>,
    #[serde(default)]
    pub result: ResultSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Subtask {
    pub fn new(id: impl Into<String>, title: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            objective: objective.into(),
            target_agent: String::new(),
            engine: EngineSelector::LlmOnly,
            parallel_group: 1,
            dependencies: Vec::new(),
            tool_allow_list: None,
            max_steps: None,
            planner_notes: None,
            result: ResultSlot::default(),
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeDescriptor {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
}

impl Default for MergeDescriptor {
    fn default() -> Self {
        Self {
            strategy: "concatenate".to_string(),
            steps: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merger_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_result_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    pub subtasks: Vec<Subtask>,
    pub merge: MergeDescriptor,
    pub metadata: PlanMetadata,
}

impl TaskGraph {
    /// Emitted when planning or validation cannot produce a structured
    /// decomposition (§4.A, §8 boundary behavior).
    pub fn fallback(goal: impl Into<String>, planner_provider: Option<String>) -> Self {
        let goal = goal.into();
        TaskGraph {
            subtasks: vec![Subtask {
                id: "fallback".to_string(),
                title: "Fallback".to_string(),
                objective: goal.clone(),
                target_agent: String::new(),
                engine: EngineSelector::LlmOnly,
                parallel_group: 1,
                dependencies: Vec::new(),
                tool_allow_list: None,
                max_steps: None,
                planner_notes: None,
                result: ResultSlot::default(),
                error_message: None,
            }],
            merge: MergeDescriptor::default(),
            metadata: PlanMetadata {
                goal,
                planner_provider,
                planner_model: None,
                merger_provider: None,
                merge_result_path: None,
                created_at: Utc::now(),
                fallback: true,
            },
        }
    }

    pub fn find(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    /// Partitions subtasks into ascending-ordered waves by parallel-group
    /// number (§4.C scheduling model).
    pub fn waves(&self) -> BTreeMap<u32, Vec<&Subtask>> {
        let mut waves: BTreeMap<u32, Vec<&Subtask>> = BTreeMap::new();
        for subtask in &self.subtasks {
            waves.entry(subtask.parallel_group).or_default().push(subtask);
        }
        waves
    }

    pub fn is_single_fallback_node(&self) -> bool {
        self.metadata.fallback && self.subtasks.len() == 1
    }
}
