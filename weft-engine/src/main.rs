use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use weft_core::{Dispatcher, Merger, PlanStore, Planner, PlannerContext};
use weft_providers::{BackendPool, OpenAiCompatibleAdapter};
use weft_types::{EngineSelector, NullSink};

mod agent_loader;
mod config;

use config::RuntimeConfig;

#[derive(Parser, Debug)]
#[command(name = "weft-engine")]
#[command(about = "Headless multi-agent task orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan, dispatch, and merge a single goal end to end.
    Run {
        goal: String,
        #[arg(long, default_value = "fallback")]
        label: String,
    },
    /// Print a persisted plan's subtask statuses.
    Inspect { plan_path: PathBuf },
    /// Re-run a persisted plan's still-pending subtasks.
    Replay { plan_path: PathBuf },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env();
    let logs_dir = weft_observability::canonical_logs_dir_from_root(&config.memory_root);
    let (_guard, _log_info) = weft_observability::init_tracing(&logs_dir, 14)
        .context("failed to initialize logging")?;

    let cli = Cli::parse();
    let agents = agent_loader::load_agents(&config.agents_dir).await?;
    let pool = Arc::new(build_pool());

    match cli.command {
        Command::Run { goal, label } => run_goal(&goal, &label, &config, pool, agents).await?,
        Command::Inspect { plan_path } => inspect_plan(&plan_path).await?,
        Command::Replay { plan_path } => replay_plan(&plan_path, &config, pool, agents).await?,
    }

    Ok(())
}

fn build_pool() -> BackendPool {
    match std::env::var("WEFT_BACKEND_URL") {
        Ok(url) => {
            let model = std::env::var("WEFT_BACKEND_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let api_key = std::env::var("WEFT_BACKEND_API_KEY").ok();
            let adapter = OpenAiCompatibleAdapter::new("primary", url, model, api_key, Duration::from_secs(120));
            BackendPool::new(vec![Arc::new(adapter)])
        }
        Err(_) => {
            info!("WEFT_BACKEND_URL unset; running with an empty backend pool (planner/merger calls will report Unavailable)");
            BackendPool::new(vec![])
        }
    }
}

async fn run_goal(
    goal: &str,
    label: &str,
    config: &RuntimeConfig,
    pool: Arc<BackendPool>,
    agents: weft_types::AgentRegistry,
) -> anyhow::Result<()> {
    let plan_store = Arc::new(PlanStore::new(&config.plan_store_root));
    let planner = Planner::new(pool.clone());
    let ctx = PlannerContext {
        agents: &agents,
        allowed_engines: Some(&EngineSelector::ALL),
        planner_provider_label: Some("primary".to_string()),
        max_tokens: config.token_profile.planner,
    };
    let graph = planner.plan(goal, &ctx).await.context("planning failed")?;
    let path = plan_store.save(&graph, label).await?;
    info!(plan = %path.display(), "plan written");

    dispatch_and_merge(&path, goal, config, pool, agents, plan_store).await
}

async fn replay_plan(
    plan_path: &std::path::Path,
    config: &RuntimeConfig,
    pool: Arc<BackendPool>,
    agents: weft_types::AgentRegistry,
) -> anyhow::Result<()> {
    let plan_store = Arc::new(PlanStore::new(&config.plan_store_root));
    let graph = plan_store.load(plan_path).await?;
    dispatch_and_merge(plan_path, &graph.metadata.goal, config, pool, agents, plan_store).await
}

async fn dispatch_and_merge(
    path: &std::path::Path,
    goal: &str,
    config: &RuntimeConfig,
    pool: Arc<BackendPool>,
    agents: weft_types::AgentRegistry,
    plan_store: Arc<PlanStore>,
) -> anyhow::Result<()> {
    let memory = Arc::new(weft_memory::MemoryStore::new(&config.memory_root, "default"));
    let tools = weft_tools::ToolRegistry::new();
    tools.register(Arc::new(weft_tools::ReadFileTool)).await.ok();
    let sink = Arc::new(NullSink);

    let dispatcher = Dispatcher::new(
        pool.clone(),
        agents,
        memory,
        tools,
        plan_store,
        sink,
        config.retry_policy,
    );

    let graph = dispatcher.run(path, CancellationToken::new()).await?;

    let merger = Merger::new(pool);
    let final_answer = match merger.merge(goal, &graph, config.token_profile.merger).await {
        Ok(text) => text,
        Err(_) => weft_core::fallback_summary(goal, &graph).await,
    };
    println!("{final_answer}");
    Ok(())
}

async fn inspect_plan(plan_path: &std::path::Path) -> anyhow::Result<()> {
    let plan_store = Arc::new(PlanStore::new(
        plan_path.parent().unwrap_or_else(|| std::path::Path::new(".")).parent().unwrap_or_else(|| std::path::Path::new(".")),
    ));
    let graph = plan_store.load(plan_path).await?;
    println!("goal: {}", graph.metadata.goal);
    for subtask in &graph.subtasks {
        println!("- [{:?}] {} ({})", subtask.result.status, subtask.title, subtask.id);
    }
    Ok(())
}
