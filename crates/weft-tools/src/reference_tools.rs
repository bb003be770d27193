use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use weft_types::{ToolParamSpec, ToolParamType, ToolSchema};

use crate::registry::Tool;

/// Reads a UTF-8 file in full, grounded on `tandem-tools::ReadTool` but
/// without its sandbox allow-list check — allow-list enforcement for this
/// runtime happens one layer up, in the Tool Runner's own allow-list gate
/// (§4.E), not inside the tool executor.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_file".to_string(),
            description: "Reads the full UTF-8 contents of a file at the given path".to_string(),
            parameters: BTreeMap::from([(
                "path".to_string(),
                ToolParamSpec {
                    param_type: ToolParamType::String,
                    description: "absolute or relative path to read".to_string(),
                    required: true,
                    items: None,
                },
            )]),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required argument: path".to_string())?;
        fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read {path}: {e}"))
    }
}
