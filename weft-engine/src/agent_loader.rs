//! Agent-profile bootstrap loader (§2.1): one YAML document per agent under
//! a directory, populating the immutable §3 `AgentRegistry`. The file
//! format is intentionally undocumented upstream (per spec §1); this loader
//! only needs enough structure to populate `Agent`'s fields, matching the
//! shape (not the schema) of `tandem-core::agents`' directory-of-documents
//! loader.

use std::path::Path;

use serde::Deserialize;
use weft_types::{Agent, AgentRegistry};

#[derive(Debug, Deserialize)]
struct AgentProfile {
    id: String,
    display_name: String,
    preamble: String,
    #[serde(default)]
    memory_categories: Vec<String>,
    #[serde(default)]
    routing_slug: Option<String>,
}

/// Reads every `*.yaml`/`*.yml` file directly under `dir` as one agent
/// profile. Missing directory is treated as zero agents rather than an
/// error, so a fresh checkout can still boot.
pub async fn load_agents(dir: &Path) -> anyhow::Result<AgentRegistry> {
    let mut agents = Vec::new();

    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Ok(AgentRegistry::new(default_agents()));
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
        if !is_yaml {
            continue;
        }
        let text = tokio::fs::read_to_string(&path).await?;
        let profile: AgentProfile = serde_yaml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("malformed agent profile {}: {e}", path.display()))?;
        agents.push(Agent {
            routing_slug: profile.routing_slug.unwrap_or_else(|| profile.id.clone()),
            id: profile.id,
            display_name: profile.display_name,
            preamble: profile.preamble,
            memory_categories: if profile.memory_categories.is_empty() {
                vec!["default".to_string()]
            } else {
                profile.memory_categories
            },
        });
    }

    if agents.is_empty() {
        agents = default_agents();
    }
    agents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(AgentRegistry::new(agents))
}

fn default_agents() -> Vec<Agent> {
    vec![Agent {
        id: "default".to_string(),
        display_name: "Default Agent".to_string(),
        preamble: "You are a capable, careful assistant.".to_string(),
        memory_categories: vec!["default".to_string()],
        routing_slug: "default".to_string(),
    }]
}
