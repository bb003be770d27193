use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;

use crate::adapter::{ChatTurn, InferenceAdapter, ProviderError, TextStream};

/// A fixed-response backend for tests and the zero-configuration fallback
/// path, mirroring `tandem-providers`' `LocalEchoProvider`. `fail_on_calls`
/// lets a test make specific invocations fail (1-indexed) to exercise the
/// Backend Pool's fallback behavior (S2/S3).
pub struct StaticAdapter {
    name: String,
    response: String,
    chunks: Vec<String>,
    fail_on_calls: HashSet<usize>,
    calls: AtomicUsize,
}

impl StaticAdapter {
    pub fn new(name: impl Into<String>, response: impl Into<String>) -> Self {
        let response = response.into();
        Self {
            name: name.into(),
            chunks: vec![response.clone()],
            response,
            fail_on_calls: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<String>) -> Self {
        self.response = chunks.concat();
        self.chunks = chunks;
        self
    }

    pub fn fail_on_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on_calls = calls.into_iter().collect();
        self
    }

    fn next_call_index(&self) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl InferenceAdapter for StaticAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _system: &str,
        _user: &str,
        _history: &[ChatTurn],
        _max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let call = self.next_call_index();
        if self.fail_on_calls.contains(&call) {
            return Err(ProviderError::Transport(format!(
                "{} stub configured to fail on call {call}",
                self.name
            )));
        }
        Ok(self.response.clone())
    }

    async fn stream(
        &self,
        _system: &str,
        _user: &str,
        _history: &[ChatTurn],
        _max_tokens: u32,
    ) -> Result<TextStream, ProviderError> {
        let call = self.next_call_index();
        if self.fail_on_calls.contains(&call) {
            return Err(ProviderError::Transport(format!(
                "{} stub configured to fail on call {call}",
                self.name
            )));
        }
        let items: Vec<Result<String, ProviderError>> =
            self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generate_returns_fixed_response() {
        let adapter = StaticAdapter::new("stub", "hello world");
        let out = adapter.generate("sys", "user", &[], 100).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn fails_only_on_configured_call_indices() {
        let adapter = StaticAdapter::new("stub", "ok").fail_on_calls([2, 3]);
        assert!(adapter.generate("s", "u", &[], 10).await.is_ok());
        assert!(adapter.generate("s", "u", &[], 10).await.is_err());
        assert!(adapter.generate("s", "u", &[], 10).await.is_err());
        assert!(adapter.generate("s", "u", &[], 10).await.is_ok());
    }
}
