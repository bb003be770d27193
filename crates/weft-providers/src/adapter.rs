use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// A single prior turn handed to an adapter alongside the live system/user
/// messages (§6 backend adapter contract).
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("policy refusal: {0}")]
    Policy(String),
}

impl ProviderError {
    /// §4.D fallback taxonomy: everything except `Policy` triggers fallback
    /// to the next backend in the pool.
    pub fn triggers_fallback(&self) -> bool {
        !matches!(self, ProviderError::Policy(_))
    }
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// One inference backend. `generate` suspends once until the terminal
/// response; `stream` suspends the caller at each yielded chunk (§4.D,
/// §4.D.1).
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system: &str,
        user: &str,
        history: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<String, ProviderError>;

    async fn stream(
        &self,
        system: &str,
        user: &str,
        history: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<TextStream, ProviderError>;
}
