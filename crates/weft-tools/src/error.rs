use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ToolRunnerError {
    #[error("step budget exhausted with no final answer")]
    Exhausted,
    #[error("tool `{tool}` failed repeatedly: {cause}")]
    ToolError { tool: String, cause: String },
}
