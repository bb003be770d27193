use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An immutable record loaded at startup. Lifetime = process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub preamble: String,
    pub memory_categories: Vec<String>,
    pub routing_slug: String,
}

#[derive(Debug, Error)]
pub enum AgentRegistryError {
    #[error("unknown agent id: {0}")]
    UnknownAgent(String),
}

/// Write-once at startup; read-only thereafter except for the active-agent
/// pointer, which is mutated only from the main loop.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
    active: Option<String>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<Agent>) -> Self {
        let active = agents.first().map(|a| a.id.clone());
        let agents = agents.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self { agents, active }
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn active(&self) -> Option<&Agent> {
        self.active.as_ref().and_then(|id| self.agents.get(id))
    }

    /// Explicit switch operation; the only way the active-agent pointer
    /// changes.
    pub fn switch_active(&mut self, id: &str) -> Result<(), AgentRegistryError> {
        if self.agents.contains_key(id) {
            self.active = Some(id.to_string());
            Ok(())
        } else {
            Err(AgentRegistryError::UnknownAgent(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            display_name: id.to_string(),
            preamble: "you are helpful".to_string(),
            memory_categories: vec!["general".to_string()],
            routing_slug: format!("slug-{id}"),
        }
    }

    #[test]
    fn first_registered_agent_is_active_by_default() {
        let registry = AgentRegistry::new(vec![agent("a"), agent("b")]);
        assert_eq!(registry.active().unwrap().id, "a");
    }

    #[test]
    fn switch_active_rejects_unknown_id() {
        let mut registry = AgentRegistry::new(vec![agent("a")]);
        let err = registry.switch_active("ghost").unwrap_err();
        assert!(matches!(err, AgentRegistryError::UnknownAgent(id) if id == "ghost"));
        assert_eq!(registry.active().unwrap().id, "a");
    }

    #[test]
    fn switch_active_changes_pointer() {
        let mut registry = AgentRegistry::new(vec![agent("a"), agent("b")]);
        registry.switch_active("b").unwrap();
        assert_eq!(registry.active().unwrap().id, "b");
    }
}
