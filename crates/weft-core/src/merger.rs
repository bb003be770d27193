//! Synthesizes the final answer from a completed `TaskGraph` (§4.F). The
//! backend composition reuses the goal-plus-excerpts shape the reference
//! corpus uses for summarization prompts; `fallback_summary` is deliberately
//! pure so two calls over the same graph are byte-identical.

use std::sync::Arc;

use thiserror::Error;
use weft_providers::BackendPool;
use weft_types::{MemoryRecord, TaskGraph};

const EXCERPT_LIMIT: usize = 2000;
const FALLBACK_EXCERPT_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum MergerError {
    #[error("merger backend unavailable: {0}")]
    Unavailable(String),
}

pub struct Merger {
    pool: Arc<BackendPool>,
}

impl Merger {
    pub fn new(pool: Arc<BackendPool>) -> Self {
        Self { pool }
    }

    /// Reads each completed subtask's memory record, truncates it, and asks
    /// the backend pool to synthesize a final answer. Callers fall back to
    /// `fallback_summary` when this returns `Err`.
    pub async fn merge(&self, goal: &str, graph: &TaskGraph, max_tokens: u32) -> Result<String, MergerError> {
        let excerpts = self.collect_excerpts(graph, EXCERPT_LIMIT).await;
        let instruction = format!(
            "Synthesize a single final answer for the goal below from the subtask \
             results that follow. Merge strategy: {strategy}. Do not include any \
             planning commentary or restate the subtask list, only the answer.\n\n\
             Goal:\n{goal}\n\n{excerpts}",
            strategy = graph.merge.strategy,
            excerpts = excerpts,
        );

        let outcome = self
            .pool
            .generate(&instruction, goal, &[], max_tokens)
            .await
            .map_err(|err| MergerError::Unavailable(err.to_string()))?;

        Ok(weft_types::strip_scratchpad(&outcome.value))
    }

    async fn collect_excerpts(&self, graph: &TaskGraph, limit: usize) -> String {
        let mut parts = Vec::new();
        for subtask in &graph.subtasks {
            let text = read_result_text(subtask).await.unwrap_or_default();
            parts.push(format!("## {} ({})\n{}", subtask.title, subtask.id, truncate(&text, limit)));
        }
        parts.join("\n\n")
    }
}

/// Deterministic fallback used when the merger backend is unavailable: the
/// goal verbatim followed by each subtask's id, title, and a short excerpt.
/// Pure function of `goal` and `graph`'s persisted state, so repeated calls
/// over an unchanged graph produce identical output.
pub async fn fallback_summary(goal: &str, graph: &TaskGraph) -> String {
    let mut out = format!("Goal: {goal}\n\n");
    for subtask in &graph.subtasks {
        let text = read_result_text(subtask).await.unwrap_or_default();
        out.push_str(&format!(
            "- {} ({}): {}\n",
            subtask.id,
            subtask.title,
            truncate(&text, FALLBACK_EXCERPT_LIMIT)
        ));
    }
    out
}

async fn read_result_text(subtask: &weft_types::Subtask) -> Option<String> {
    let path = subtask.result.memory_record_path.as_ref()?;
    let bytes = tokio::fs::read_to_string(path).await.ok()?;
    let record = MemoryRecord::parse(&bytes).ok()?;
    Some(record.assistant_turn)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(limit).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{
        EngineSelector, MemoryRecordHeader, MergeDescriptor, PlanMetadata, ResultSlot, Subtask,
        SubtaskStatus,
    };
    use weft_providers::StaticAdapter;

    async fn write_record(dir: &std::path::Path, name: &str, assistant_turn: &str) -> std::path::PathBuf {
        let record = MemoryRecord {
            header: MemoryRecordHeader {
                agent_display_name: "Writer".to_string(),
                agent_key: "writer".to_string(),
                workspace: "demo".to_string(),
                timestamp: chrono::Utc::now(),
                tags: vec![],
            },
            system_prompt: String::new(),
            user_turn: "do it".to_string(),
            assistant_turn: assistant_turn.to_string(),
        };
        let path = dir.join(name);
        tokio::fs::write(&path, record.render()).await.unwrap();
        path
    }

    fn graph_with_result(path: std::path::PathBuf) -> TaskGraph {
        let mut subtask = Subtask::new("a", "Title", "Objective");
        subtask.engine = EngineSelector::LlmOnly;
        subtask.result = ResultSlot {
            status: SubtaskStatus::Completed,
            memory_record_path: Some(path),
        };
        TaskGraph {
            subtasks: vec![subtask],
            merge: MergeDescriptor::default(),
            metadata: PlanMetadata {
                goal: "goal".to_string(),
                planner_provider: None,
                planner_model: None,
                merger_provider: None,
                merge_result_path: None,
                created_at: chrono::Utc::now(),
                fallback: false,
            },
        }
    }

    #[tokio::test]
    async fn merge_reads_subtask_results_into_the_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(dir.path(), "a.txt", "the answer is 42").await;
        let graph = graph_with_result(path);

        let pool = Arc::new(BackendPool::new(vec![std::sync::Arc::new(StaticAdapter::new(
            "merger",
            "final synthesized answer",
        ))]));
        let merger = Merger::new(pool);
        let result = merger.merge("goal", &graph, 512).await.unwrap();
        assert_eq!(result, "final synthesized answer");
    }

    #[tokio::test]
    async fn fallback_summary_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(dir.path(), "a.txt", "the answer is 42").await;
        let graph = graph_with_result(path);

        let first = fallback_summary("goal", &graph).await;
        let second = fallback_summary("goal", &graph).await;
        assert_eq!(first, second);
        assert!(first.contains("the answer is 42"));
        assert!(first.starts_with("Goal: goal"));
    }

    #[tokio::test]
    async fn unavailable_merger_backend_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(dir.path(), "a.txt", "partial").await;
        let graph = graph_with_result(path);

        let pool = Arc::new(BackendPool::new(vec![]));
        let merger = Merger::new(pool);
        let err = merger.merge("goal", &graph, 512).await.unwrap_err();
        assert!(matches!(err, MergerError::Unavailable(_)));
    }
}
