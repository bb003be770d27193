//! Structural validation of a `TaskGraph` before it is persisted or
//! dispatched (§3 invariants). Cycle detection is a 3-color DFS, adapted
//! from `taskai::graph::cycle::detect_cycle`.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use weft_types::{AgentRegistry, EngineSelector, TaskGraph};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("duplicate subtask id `{0}`")]
    DuplicateId(String),
    #[error("subtask `{subtask}` depends on unknown subtask `{dependency}`")]
    UnknownDependency { subtask: String, dependency: String },
    #[error("subtask `{subtask}` depends on `{dependency}` in the same parallel group")]
    IntraGroupDependency { subtask: String, dependency: String },
    #[error("dependency cycle: {0}")]
    Cycle(String),
    #[error("subtask `{subtask}` targets unknown agent `{agent}`")]
    UnknownAgent { subtask: String, agent: String },
    #[error("subtask `{subtask}` uses an engine selector outside the allowed set")]
    DisallowedEngine { subtask: String, engine: EngineSelector },
}

pub struct PlanValidator;

impl PlanValidator {
    /// Returns every violation found; an empty vec means the graph is valid.
    /// `allowed_engines` is the whitelist shared with the dispatcher — `None`
    /// accepts every `EngineSelector` variant.
    pub fn validate(
        graph: &TaskGraph,
        agents: &AgentRegistry,
        allowed_engines: Option<&[EngineSelector]>,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for subtask in &graph.subtasks {
            if !seen_ids.insert(subtask.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(subtask.id.clone()));
            }
        }

        let ids: HashSet<&str> = graph.subtasks.iter().map(|s| s.id.as_str()).collect();
        let groups: HashMap<&str, u32> = graph
            .subtasks
            .iter()
            .map(|s| (s.id.as_str(), s.parallel_group))
            .collect();

        for subtask in &graph.subtasks {
            for dep in &subtask.dependencies {
                if !ids.contains(dep.as_str()) {
                    issues.push(ValidationIssue::UnknownDependency {
                        subtask: subtask.id.clone(),
                        dependency: dep.clone(),
                    });
                    continue;
                }
                if groups.get(dep.as_str()) == Some(&subtask.parallel_group) {
                    issues.push(ValidationIssue::IntraGroupDependency {
                        subtask: subtask.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }

            if !agents.contains(&subtask.target_agent) {
                issues.push(ValidationIssue::UnknownAgent {
                    subtask: subtask.id.clone(),
                    agent: subtask.target_agent.clone(),
                });
            }

            if let Some(allowed) = allowed_engines {
                if !allowed.contains(&subtask.engine) {
                    issues.push(ValidationIssue::DisallowedEngine {
                        subtask: subtask.id.clone(),
                        engine: subtask.engine,
                    });
                }
            }
        }

        if let Some(cycle_path) = detect_cycle(graph) {
            issues.push(ValidationIssue::Cycle(cycle_path.join(" -> ")));
        }

        issues
    }
}

/// 3-color DFS: white (unvisited) / gray (on stack) / black (done). A gray
/// node reached again means a cycle; the path is reconstructed from the
/// call stack for the error message.
const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

fn detect_cycle(graph: &TaskGraph) -> Option<Vec<String>> {
    let edges: HashMap<&str, &[String]> = graph
        .subtasks
        .iter()
        .map(|s| (s.id.as_str(), s.dependencies.as_slice()))
        .collect();

    let mut color: HashMap<&str, u8> = graph.subtasks.iter().map(|s| (s.id.as_str(), WHITE)).collect();
    let mut stack: Vec<String> = Vec::new();

    for subtask in &graph.subtasks {
        if color.get(subtask.id.as_str()) == Some(&WHITE) {
            if let Some(cycle) = visit(subtask.id.as_str(), &edges, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, &'a [String]>,
    color: &mut HashMap<&'a str, u8>,
    stack: &mut Vec<String>,
) -> Option<Vec<String>> {
    color.insert(node, GRAY);
    stack.push(node.to_string());

    if let Some(deps) = edges.get(node) {
        for dep in *deps {
            match color.get(dep.as_str()).copied() {
                Some(GRAY) => {
                    let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                Some(BLACK) | None => {}
                _ => {
                    if let Some(found) = visit(dep.as_str(), edges, color, stack) {
                        return Some(found);
                    }
                }
            }
        }
    }

    stack.pop();
    color.insert(node, BLACK);
    None
}
