use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use weft_types::ToolSchema;

/// A callable exposed to the Tool Runner. Executors return a UTF-8 string
/// (§6 "tool executor contract"); errors propagate as an observation, never
/// a panic.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, args: Value) -> Result<String, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRegistrationError {
    pub tool_name: String,
    pub reason: String,
}

/// `Arc<RwLock<HashMap<...>>>` registry matching `tandem-tools::ToolRegistry`,
/// adapted to this crate's own `Tool` trait and schema shape (§4.E.1).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects a tool whose schema fails `ToolSchema::validate_schema`
    /// rather than admitting it silently, matching
    /// `tandem-tools::validate_tool_schemas`'s registry-population-time
    /// check.
    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolRegistrationError> {
        let schema = tool.schema();
        schema
            .validate_schema()
            .map_err(|e| ToolRegistrationError {
                tool_name: e.tool_name,
                reason: format!("{}: {}", e.param, e.reason),
            })?;
        self.tools.write().await.insert(schema.name, tool);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.tools.read().await.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_types::{ToolParamSpec, ToolParamType};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".to_string(),
                description: "echoes back".to_string(),
                parameters: BTreeMap::new(),
            }
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            Ok(args.to_string())
        }
    }

    struct BrokenArray;

    #[async_trait]
    impl Tool for BrokenArray {
        fn schema(&self) -> ToolSchema {
            let mut parameters = BTreeMap::new();
            parameters.insert(
                "items".to_string(),
                ToolParamSpec {
                    param_type: ToolParamType::Array,
                    description: "broken".to_string(),
                    required: false,
                    items: None,
                },
            );
            ToolSchema {
                name: "broken".to_string(),
                description: "broken array".to_string(),
                parameters,
            }
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn register_and_get_round_trips() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).await.unwrap();
        assert!(registry.get("echo").await.is_some());
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn list_is_name_sorted() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).await.unwrap();
        let schemas = registry.list().await;
        assert_eq!(schemas[0].name, "echo");
    }

    #[tokio::test]
    async fn register_rejects_structurally_invalid_schema() {
        let registry = ToolRegistry::new();
        let err = registry.register(Arc::new(BrokenArray)).await.unwrap_err();
        assert_eq!(err.tool_name, "broken");
        assert!(registry.get("broken").await.is_none());
    }
}
