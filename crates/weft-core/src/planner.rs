//! Decomposes a goal into a `TaskGraph` via a templated planner prompt
//! (§4.A). Prompt-template-as-const-string style is grounded on
//! `GoldBot::agent::plan::PLAN_MODE_ASSIST_CONTEXT_APPENDIX`; the output
//! grammar here is JSON rather than that file's XML tags, because the
//! planner's job is to produce a structured graph, not a single tool call.

use serde::Deserialize;
use thiserror::Error;
use weft_providers::{BackendPool, ProviderError};
use weft_types::{
    AgentRegistry, EngineSelector, MergeDescriptor, PlanMetadata, ResultSlot, Subtask, TaskGraph,
};

use crate::validator::PlanValidator;

const PROMPT_TEMPLATE: &str = "\
You are the planning stage of a multi-agent orchestrator. Decompose the \
goal below into a directed acyclic graph of subtasks.

Respond with ONLY a JSON object of this shape, no prose, no code fences:
{
  \"subtasks\": [
    {
      \"id\": \"unique-slug\",
      \"title\": \"short title\",
      \"objective\": \"what this subtask must accomplish\",
      \"target_agent\": \"one of the available agent ids\",
      \"engine\": \"llm-only | agentic-tool | subprocess\",
      \"parallel_group\": 1,
      \"dependencies\": [\"ids of subtasks this one requires\"]
    }
  ],
  \"merge_strategy\": \"concatenate\"
}

Rules:
- ids are unique within the graph.
- dependencies must name earlier subtasks, never a subtask in the same parallel_group.
- target_agent must be one of the available agent ids listed below.
- engine must be one of the three listed values.

Available agents:
{agents}

Goal:
{goal}
";

pub struct PlannerContext<'a> {
    pub agents: &'a AgentRegistry,
    pub allowed_engines: Option<&'a [EngineSelector]>,
    pub planner_provider_label: Option<String>,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner backend unavailable: {0}")]
    Unavailable(String),
    #[error("planner produced output that could not be parsed: {raw}")]
    InvalidOutput { raw: String },
    #[error("planner request timed out")]
    Timeout,
}

#[derive(Debug, Deserialize)]
struct RawTaskGraph {
    subtasks: Vec<RawSubtask>,
    #[serde(default)]
    merge_strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    id: String,
    title: String,
    objective: String,
    target_agent: String,
    engine: String,
    #[serde(default = "default_group")]
    parallel_group: u32,
    #[serde(default)]
    dependencies: Vec<String>,
}

fn default_group() -> u32 {
    1
}

pub struct Planner {
    pool: std::sync::Arc<BackendPool>,
}

impl Planner {
    pub fn new(pool: std::sync::Arc<BackendPool>) -> Self {
        Self { pool }
    }

    pub fn render_prompt(&self, ctx: &PlannerContext<'_>) -> String {
        let agents: String = ctx
            .agents
            .ids()
            .map(|id| format!("- {id}"))
            .collect::<Vec<_>>()
            .join("\n");
        PROMPT_TEMPLATE.replace("{agents}", &agents)
    }

    /// Plans the goal. On any structural validation failure (including
    /// unparseable model output) this falls back to a single-node graph
    /// rather than propagating an error — only an unreachable backend or a
    /// timeout surfaces as `Err`.
    pub async fn plan(&self, goal: &str, ctx: &PlannerContext<'_>) -> Result<TaskGraph, PlannerError> {
        let system = self.render_prompt(ctx);
        let outcome = self
            .pool
            .generate(&system, goal, &[], ctx.max_tokens)
            .await
            .map_err(|err| match err {
                ProviderError::Timeout => PlannerError::Timeout,
                other => PlannerError::Unavailable(other.to_string()),
            })?;

        match self.parse_raw_plan(&outcome.value, goal, ctx) {
            Ok(graph) => {
                let issues = PlanValidator::validate(&graph, ctx.agents, ctx.allowed_engines);
                if issues.is_empty() {
                    Ok(graph)
                } else {
                    Ok(TaskGraph::fallback(goal, ctx.planner_provider_label.clone()))
                }
            }
            Err(_) => Ok(TaskGraph::fallback(goal, ctx.planner_provider_label.clone())),
        }
    }

    fn parse_raw_plan(&self, raw: &str, goal: &str, ctx: &PlannerContext<'_>) -> Result<TaskGraph, PlannerError> {
        let cleaned = clean_model_output(raw);
        let parsed: RawTaskGraph = serde_json::from_str(&cleaned).map_err(|_| PlannerError::InvalidOutput {
            raw: raw.to_string(),
        })?;

        let mut subtasks = Vec::with_capacity(parsed.subtasks.len());
        for raw_sub in parsed.subtasks {
            let engine = EngineSelector::parse(&raw_sub.engine).map_err(|_| PlannerError::InvalidOutput {
                raw: raw.to_string(),
            })?;
            subtasks.push(Subtask {
                id: raw_sub.id,
                title: raw_sub.title,
                objective: raw_sub.objective,
                target_agent: raw_sub.target_agent,
                engine,
                parallel_group: raw_sub.parallel_group,
                dependencies: raw_sub.dependencies,
                tool_allow_list: None,
                max_steps: None,
                planner_notes: None,
                result: ResultSlot::default(),
                error_message: None,
            });
        }

        Ok(TaskGraph {
            subtasks,
            merge: MergeDescriptor {
                strategy: parsed.merge_strategy.unwrap_or_else(|| "concatenate".to_string()),
                steps: None,
            },
            metadata: PlanMetadata {
                goal: goal.to_string(),
                planner_provider: ctx.planner_provider_label.clone(),
                planner_model: None,
                merger_provider: None,
                merge_result_path: None,
                created_at: chrono::Utc::now(),
                fallback: false,
            },
        })
    }
}

/// Strips a reserved scratch-pad region and any surrounding Markdown code
/// fence the model wrapped the JSON payload in.
fn clean_model_output(raw: &str) -> String {
    let stripped = weft_types::strip_scratchpad(raw);
    let trimmed = stripped.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches("json").trim_start();
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}
