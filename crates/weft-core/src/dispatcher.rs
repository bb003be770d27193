//! Executes a validated `TaskGraph` to completion (§4.C): schedules waves in
//! ascending `parallel_group` order, runs every subtask in a wave
//! concurrently, and aborts the whole run the moment any subtask fails so
//! no later wave begins.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use weft_providers::BackendPool;
use weft_tools::ToolRunner;
use weft_types::{AgentRegistry, DispatchCause, EngineSelector, OutputSink, SinkStatus, SubtaskStatus, TaskGraph};

use crate::plan_store::PlanStore;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("plan store error: {0}")]
    PlanStore(#[from] crate::plan_store::PlanStoreError),
    #[error("subtask `{subtask_id}` aborted the run: {cause:?}")]
    Aborted { subtask_id: String, cause: DispatchCause },
}

const DEFAULT_MAX_STEPS: u32 = 12;
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_MEMORY_CONTEXT_LIMIT: usize = 5;

pub struct Dispatcher {
    pool: Arc<BackendPool>,
    agents: AgentRegistry,
    memory: Arc<weft_memory::MemoryStore>,
    tools: weft_tools::ToolRegistry,
    plan_store: Arc<PlanStore>,
    sink: Arc<dyn OutputSink>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<BackendPool>,
        agents: AgentRegistry,
        memory: Arc<weft_memory::MemoryStore>,
        tools: weft_tools::ToolRegistry,
        plan_store: Arc<PlanStore>,
        sink: Arc<dyn OutputSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            agents,
            memory,
            tools,
            plan_store,
            sink,
            retry,
        }
    }

    /// Runs every wave of the plan at `path` in order, returning the final
    /// persisted graph. Aborts without scheduling further waves as soon as
    /// any subtask in the current wave fails.
    pub async fn run(&self, path: &std::path::Path, cancel: CancellationToken) -> Result<TaskGraph, DispatcherError> {
        self.sink.start();

        let group_numbers: Vec<u32> = {
            let graph = self.plan_store.load(path).await?;
            graph.waves().keys().copied().collect()
        };

        'waves: for group in group_numbers {
            let subtask_ids: Vec<String> = {
                let graph = self.plan_store.load(path).await?;
                graph
                    .waves()
                    .get(&group)
                    .map(|subs| subs.iter().map(|s| s.id.clone()).collect())
                    .unwrap_or_default()
            };

            let mut handles = Vec::new();
            for id in subtask_ids {
                let cancel = cancel.clone();
                let path = path.to_path_buf();
                let this = self.clone_handles();
                handles.push(tokio::spawn(async move { this.run_subtask(&path, &id, cancel).await }));
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(cause)) => {
                        self.sink.stop();
                        return Err(DispatcherError::Aborted {
                            subtask_id: cause.0,
                            cause: cause.1,
                        });
                    }
                    Err(_join_err) => {
                        self.sink.stop();
                        return Err(DispatcherError::Aborted {
                            subtask_id: String::new(),
                            cause: DispatchCause::Transport,
                        });
                    }
                }
            }

            let graph = self.plan_store.load(path).await?;
            if graph.subtasks.iter().any(|s| s.result.status == SubtaskStatus::Failed) {
                self.sink.stop();
                break 'waves;
            }
        }

        self.sink.stop();
        Ok(self.plan_store.load(path).await?)
    }

    fn clone_handles(&self) -> DispatchWorker {
        DispatchWorker {
            pool: self.pool.clone(),
            agents: self.agents.clone(),
            memory: self.memory.clone(),
            tools: self.tools.clone(),
            plan_store: self.plan_store.clone(),
            sink: self.sink.clone(),
            retry: self.retry,
        }
    }
}

/// Per-subtask execution context, cheaply cloned per spawned task so the
/// dispatcher itself never needs `Arc<Mutex<Dispatcher>>`.
struct DispatchWorker {
    pool: Arc<BackendPool>,
    agents: AgentRegistry,
    memory: Arc<weft_memory::MemoryStore>,
    tools: weft_tools::ToolRegistry,
    plan_store: Arc<PlanStore>,
    sink: Arc<dyn OutputSink>,
    retry: RetryPolicy,
}

impl DispatchWorker {
    async fn run_subtask(
        &self,
        path: &std::path::Path,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<(), (String, DispatchCause)> {
        if cancel.is_cancelled() {
            self.fail(path, id, DispatchCause::Cancelled, "run cancelled").await;
            return Err((id.to_string(), DispatchCause::Cancelled));
        }

        let subtask = {
            let graph = self.plan_store.load(path).await.map_err(|_| (id.to_string(), DispatchCause::Transport))?;
            graph.find(id).cloned().ok_or_else(|| (id.to_string(), DispatchCause::Transport))?
        };

        let Some(agent) = self.agents.get(&subtask.target_agent).cloned() else {
            self.fail(path, id, DispatchCause::AgentMissing, "target agent not registered").await;
            return Err((id.to_string(), DispatchCause::AgentMissing));
        };

        self.plan_store
            .update_subtask(path, id, |s| s.result.status = SubtaskStatus::Running)
            .await
            .map_err(|_| (id.to_string(), DispatchCause::Transport))?;
        self.sink.status(id, SinkStatus::Running);

        let context = self
            .memory
            .load_context(&agent, &subtask.objective, DEFAULT_MEMORY_CONTEXT_LIMIT)
            .await
            .unwrap_or_default();
        let context_text: String = context
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let objective = if context_text.is_empty() {
            subtask.objective.clone()
        } else {
            format!("{}\n\nRelevant prior context:\n{}", subtask.objective, context_text)
        };

        let outcome = match subtask.engine {
            EngineSelector::LlmOnly => self.run_llm_only(id, &agent.preamble, &objective, cancel.clone()).await,
            EngineSelector::AgenticTool => self.run_agentic_tool(id, &subtask, &agent.preamble, &objective, cancel.clone()).await,
            EngineSelector::Subprocess => self.run_subprocess(&objective, cancel.clone()).await,
        };

        match outcome {
            Ok(text) => {
                let record_path = self
                    .memory
                    .save(&agent, &subtask.objective, &text)
                    .await
                    .map_err(|_| (id.to_string(), DispatchCause::Transport))?;
                self.plan_store
                    .update_subtask(path, id, |s| {
                        s.result.status = SubtaskStatus::Completed;
                        s.result.memory_record_path = Some(record_path);
                    })
                    .await
                    .map_err(|_| (id.to_string(), DispatchCause::Transport))?;
                self.sink.status(id, SinkStatus::Completed);
                Ok(())
            }
            Err(cause) => {
                self.fail(path, id, cause, "engine execution failed").await;
                Err((id.to_string(), cause))
            }
        }
    }

    async fn fail(&self, path: &std::path::Path, id: &str, cause: DispatchCause, message: &str) {
        tracing::warn!(subtask = id, cause = cause.as_str(), "subtask failed: {message}");
        let _ = self
            .plan_store
            .update_subtask(path, id, |s| {
                s.result.status = SubtaskStatus::Failed;
                s.error_message = Some(message.to_string());
            })
            .await;
        self.sink.status(id, SinkStatus::Failed);
    }

    async fn run_llm_only(
        &self,
        id: &str,
        preamble: &str,
        objective: &str,
        cancel: CancellationToken,
    ) -> Result<String, DispatchCause> {
        for attempt in 0..self.retry.attempts {
            if cancel.is_cancelled() {
                return Err(DispatchCause::Cancelled);
            }
            let call = self.pool.generate(preamble, objective, &[], DEFAULT_MAX_TOKENS);
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(DispatchCause::Cancelled),
                r = call => r,
            };
            match result {
                Ok(outcome) => {
                    self.sink.chunk(id, &outcome.value);
                    return Ok(weft_types::strip_scratchpad(&outcome.value));
                }
                Err(_) if attempt + 1 < self.retry.attempts => {
                    sleep(self.retry.delay).await;
                }
                Err(_) => return Err(DispatchCause::Transport),
            }
        }
        Err(DispatchCause::Transport)
    }

    async fn run_agentic_tool(
        &self,
        id: &str,
        subtask: &weft_types::Subtask,
        preamble: &str,
        objective: &str,
        cancel: CancellationToken,
    ) -> Result<String, DispatchCause> {
        let runner = ToolRunner::new(self.pool.clone(), self.tools.clone(), self.sink.clone());
        let allow_list = subtask.tool_allow_list.clone().unwrap_or_default();
        let max_steps = subtask.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        let run = runner.run_with_status(id, preamble, objective, &allow_list, max_steps, DEFAULT_MAX_TOKENS);
        tokio::select! {
            _ = cancel.cancelled() => Err(DispatchCause::Cancelled),
            r = run => r.map_err(|_| DispatchCause::ToolRunner),
        }
    }

    /// The subtask model carries no dedicated command/args fields (§9 open
    /// question), so the objective text itself is the shell command line:
    /// whitespace-split into a program and its arguments, run in the
    /// process working directory with no stdin.
    async fn run_subprocess(&self, objective: &str, cancel: CancellationToken) -> Result<String, DispatchCause> {
        let mut words = objective.split_whitespace();
        let Some(program) = words.next() else {
            return Err(DispatchCause::Transport);
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        let outcome = crate::subprocess::SubprocessAdapter::run(
            program,
            &args,
            std::path::Path::new("."),
            None,
            Duration::from_secs(60),
            cancel,
        )
        .await
        .map_err(|e| match e {
            crate::subprocess::SubprocessError::Cancelled => DispatchCause::Cancelled,
            _ => DispatchCause::Transport,
        })?;

        if outcome.exit_code == 0 {
            Ok(outcome.stdout)
        } else {
            Err(DispatchCause::Transport)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_providers::StaticAdapter;
    use weft_types::{Agent, MergeDescriptor, PlanMetadata, RecordingSink, Subtask};

    fn agents() -> AgentRegistry {
        AgentRegistry::new(vec![Agent {
            id: "writer".to_string(),
            display_name: "Writer".to_string(),
            preamble: "be helpful".to_string(),
            memory_categories: vec!["default".to_string()],
            routing_slug: "writer".to_string(),
        }])
    }

    fn two_wave_graph() -> TaskGraph {
        let mut a = Subtask::new("a", "A", "objective a");
        a.target_agent = "writer".to_string();
        a.engine = EngineSelector::LlmOnly;
        a.parallel_group = 1;
        let mut b = Subtask::new("b", "B", "objective b");
        b.target_agent = "writer".to_string();
        b.engine = EngineSelector::LlmOnly;
        b.parallel_group = 2;
        b.dependencies = vec!["a".to_string()];
        TaskGraph {
            subtasks: vec![a, b],
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
    async fn runs_all_subtasks_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let plan_store = Arc::new(PlanStore::new(dir.path().join("plans")));
        let path = plan_store.save(&two_wave_graph(), "goal").await.unwrap();

        let pool = Arc::new(BackendPool::new(vec![Arc::new(StaticAdapter::new("static", "the result"))]));
        let memory = Arc::new(weft_memory::MemoryStore::new(dir.path().join("memory"), "demo"));
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(
            pool,
            agents(),
            memory,
            weft_tools::ToolRegistry::new(),
            plan_store.clone(),
            sink,
            RetryPolicy::default(),
        );

        let graph = dispatcher.run(&path, CancellationToken::new()).await.unwrap();
        assert!(graph.subtasks.iter().all(|s| s.result.status == SubtaskStatus::Completed));
    }

    #[tokio::test]
    async fn missing_agent_fails_the_subtask_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let plan_store = Arc::new(PlanStore::new(dir.path().join("plans")));
        let mut graph = two_wave_graph();
        graph.subtasks[0].target_agent = "ghost".to_string();
        let path = plan_store.save(&graph, "goal").await.unwrap();

        let pool = Arc::new(BackendPool::new(vec![Arc::new(StaticAdapter::new("static", "result"))]));
        let memory = Arc::new(weft_memory::MemoryStore::new(dir.path().join("memory"), "demo"));
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(
            pool,
            agents(),
            memory,
            weft_tools::ToolRegistry::new(),
            plan_store.clone(),
            sink,
            RetryPolicy::default(),
        );

        let err = dispatcher.run(&path, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Aborted { cause: DispatchCause::AgentMissing, .. }
        ));

        let final_graph = plan_store.load(&path).await.unwrap();
        assert_eq!(final_graph.find("b").unwrap().result.status, SubtaskStatus::Pending);
    }

    #[tokio::test]
    async fn subprocess_engine_runs_the_objective_as_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let plan_store = Arc::new(PlanStore::new(dir.path().join("plans")));
        let mut subtask = Subtask::new("a", "A", "echo hello-from-subprocess");
        subtask.target_agent = "writer".to_string();
        subtask.engine = EngineSelector::Subprocess;
        let graph = TaskGraph {
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
        };
        let path = plan_store.save(&graph, "goal").await.unwrap();

        let pool = Arc::new(BackendPool::new(vec![Arc::new(StaticAdapter::new("static", "unused"))]));
        let memory = Arc::new(weft_memory::MemoryStore::new(dir.path().join("memory"), "demo"));
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(
            pool,
            agents(),
            memory,
            weft_tools::ToolRegistry::new(),
            plan_store.clone(),
            sink,
            RetryPolicy::default(),
        );

        let result = dispatcher.run(&path, CancellationToken::new()).await.unwrap();
        assert_eq!(result.subtasks[0].result.status, SubtaskStatus::Completed);
    }

    #[tokio::test]
    async fn already_cancelled_token_fails_subtasks_as_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let plan_store = Arc::new(PlanStore::new(dir.path().join("plans")));
        let path = plan_store.save(&two_wave_graph(), "goal").await.unwrap();

        let pool = Arc::new(BackendPool::new(vec![Arc::new(StaticAdapter::new("static", "result"))]));
        let memory = Arc::new(weft_memory::MemoryStore::new(dir.path().join("memory"), "demo"));
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(
            pool,
            agents(),
            memory,
            weft_tools::ToolRegistry::new(),
            plan_store.clone(),
            sink,
            RetryPolicy::default(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = dispatcher.run(&path, cancel).await.unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Aborted { cause: DispatchCause::Cancelled, .. }
        ));
    }
}
