use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParamSpec {
    #[serde(rename = "type")]
    pub param_type: ToolParamType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Element type for `param_type == Array`; absent for any other type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ToolParamType>,
}

/// Name, description, structured input schema — the inert half of a
/// `ToolDescriptor` (§3); the executor callable lives behind the `Tool`
/// trait in `weft-tools`, which this schema is attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ToolParamSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchemaValidationError {
    pub tool_name: String,
    pub param: String,
    pub reason: String,
}

impl ToolSchema {
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }

    /// Registry-population-time structural check (§4.E.1): an
    /// `array`-typed parameter must declare its element type.
    pub fn validate_schema(&self) -> Result<(), ToolSchemaValidationError> {
        for (name, spec) in &self.parameters {
            if spec.param_type == ToolParamType::Array && spec.items.is_none() {
                return Err(ToolSchemaValidationError {
                    tool_name: self.name.clone(),
                    param: name.clone(),
                    reason: "array parameter missing items".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Checks a candidate argument object against the declared schema:
    /// every required parameter must be present; every present parameter
    /// must be declared. Does not check value types beyond presence —
    /// callers needing stricter validation compose this with their own
    /// type checks.
    pub fn validate_arguments(&self, args: &serde_json::Map<String, serde_json::Value>) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        for name in self.required_params() {
            if !args.contains_key(name) {
                problems.push(format!("missing required argument: {name}"));
            }
        }
        for key in args.keys() {
            if !self.parameters.contains_key(key) {
                problems.push(format!("unknown argument: {key}"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
