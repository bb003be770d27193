//! Durable home for task graphs (§4.B): pretty-printed JSON, written with
//! `weft_types::atomic_write`, guarded by a per-path lock so a read-update-
//! write cycle from the dispatcher never races a concurrent one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use weft_types::{Subtask, TaskGraph};

#[derive(Debug, Error)]
pub enum PlanStoreError {
    #[error("plan store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed plan JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no subtask `{0}` in plan")]
    NotFound(String),
}

pub struct PlanStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PlanStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Writes a new plan file under `<root>/plans/<timestamp>_<slug>.json`
    /// and returns its path.
    pub async fn save(&self, graph: &TaskGraph, label: &str) -> Result<PathBuf, PlanStoreError> {
        let dir = self.root.join("plans");
        tokio::fs::create_dir_all(&dir).await?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.f");
        let path = dir.join(format!("{stamp}_{}.json", slugify(label)));
        let body = serde_json::to_vec_pretty(graph)?;
        weft_types::atomic_write(&path, &body)?;
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> Result<TaskGraph, PlanStoreError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads the plan, applies `mutate` to the named subtask, and writes the
    /// result back, serialized against any other update in flight on the
    /// same path.
    pub async fn update_subtask(
        &self,
        path: &Path,
        id: &str,
        mutate: impl FnOnce(&mut Subtask),
    ) -> Result<(), PlanStoreError> {
        let lock = self.lock_for(path).await;
        let _guard = lock.lock().await;

        let mut graph = self.load(path).await?;
        let subtask = graph
            .find_mut(id)
            .ok_or_else(|| PlanStoreError::NotFound(id.to_string()))?;
        mutate(subtask);

        let body = serde_json::to_vec_pretty(&graph)?;
        weft_types::atomic_write(path, &body)?;
        Ok(())
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

fn slugify(text: &str) -> String {
    let mut slug: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "plan".to_string()
    } else {
        slug.chars().take(40).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{EngineSelector, MergeDescriptor, PlanMetadata, SubtaskStatus};

    fn sample_graph() -> TaskGraph {
        let mut subtask = Subtask::new("a", "Title", "Objective");
        subtask.target_agent = "writer".to_string();
        subtask.engine = EngineSelector::LlmOnly;
        TaskGraph {
            subtasks: vec![subtask],
            merge: MergeDescriptor::default(),
            metadata: PlanMetadata {
                goal: "goal".to_string(),
                planner_provider: None,
                planner_model: None,
                merger_provider: None,
                merge_result_path: None,
                created_at: Utc::now(),
                fallback: false,
            },
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_the_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let graph = sample_graph();
        let path = store.save(&graph, "My Goal").await.unwrap();
        assert!(path.to_string_lossy().ends_with(".json"));

        let loaded = store.load(&path).await.unwrap();
        assert_eq!(loaded.subtasks[0].id, "a");
        assert_eq!(loaded.metadata.goal, "goal");
    }

    #[tokio::test]
    async fn update_subtask_persists_the_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let path = store.save(&sample_graph(), "goal").await.unwrap();

        store
            .update_subtask(&path, "a", |s| s.result.status = SubtaskStatus::Running)
            .await
            .unwrap();

        let loaded = store.load(&path).await.unwrap();
        assert_eq!(loaded.subtasks[0].result.status, SubtaskStatus::Running);
    }

    #[tokio::test]
    async fn update_subtask_rejects_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let path = store.save(&sample_graph(), "goal").await.unwrap();

        let err = store.update_subtask(&path, "ghost", |_| {}).await.unwrap_err();
        assert!(matches!(err, PlanStoreError::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn concurrent_updates_to_the_same_plan_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PlanStore::new(dir.path()));
        let mut graph = sample_graph();
        for i in 1..5 {
            let mut s = Subtask::new(format!("s{i}"), "t", "o");
            s.target_agent = "writer".to_string();
            graph.subtasks.push(s);
        }
        let path = store.save(&graph, "goal").await.unwrap();

        let mut handles = Vec::new();
        for i in 1..5 {
            let store = store.clone();
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_subtask(&path, &format!("s{i}"), |s| s.result.status = SubtaskStatus::Completed)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let loaded = store.load(&path).await.unwrap();
        for i in 1..5 {
            let s = loaded.find(&format!("s{i}")).unwrap();
            assert_eq!(s.result.status, SubtaskStatus::Completed);
        }
    }
}
