use std::sync::Arc;

use tracing::warn;

use crate::adapter::{ChatTurn, InferenceAdapter, ProviderError, TextStream};

/// The text a backend produced plus which backend produced it, so callers
/// can label output by source (§4.D "reports which backend succeeded").
#[derive(Debug)]
pub struct BackendOutcome<T> {
    pub backend_name: String,
    pub value: T,
}

/// Tries backends in fixed priority order, falling back to the next one on
/// any fallback-eligible error. Adapted from `tandem-providers::ProviderRegistry`'s
/// explicit-or-default selection model into a true sequential fallback
/// chain, since §4.D requires trying every configured backend in order
/// rather than picking exactly one.
pub struct BackendPool {
    backends: Vec<Arc<dyn InferenceAdapter>>,
}

impl BackendPool {
    pub fn new(backends: Vec<Arc<dyn InferenceAdapter>>) -> Self {
        Self { backends }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub async fn generate(
        &self,
        system: &str,
        user: &str,
        history: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<BackendOutcome<String>, ProviderError> {
        let mut last_err = ProviderError::Transport("no backends configured".to_string());
        for backend in &self.backends {
            match backend.generate(system, user, history, max_tokens).await {
                Ok(value) => {
                    return Ok(BackendOutcome {
                        backend_name: backend.name().to_string(),
                        value,
                    })
                }
                Err(err) if err.triggers_fallback() => {
                    warn!(backend = backend.name(), error = %err, "backend failed, falling back");
                    last_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    pub async fn stream(
        &self,
        system: &str,
        user: &str,
        history: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<BackendOutcome<TextStream>, ProviderError> {
        let mut last_err = ProviderError::Transport("no backends configured".to_string());
        for backend in &self.backends {
            match backend.stream(system, user, history, max_tokens).await {
                Ok(value) => {
                    return Ok(BackendOutcome {
                        backend_name: backend.name().to_string(),
                        value,
                    })
                }
                Err(err) if err.triggers_fallback() => {
                    warn!(backend = backend.name(), error = %err, "backend failed, falling back");
                    last_err = err;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }
}
