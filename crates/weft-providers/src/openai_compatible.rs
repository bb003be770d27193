use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;

use crate::adapter::{ChatTurn, InferenceAdapter, ProviderError, TextStream};
use crate::sse::{drain_frames, parse_frame, SseEvent};

/// A backend speaking the OpenAI chat-completions wire shape over HTTP/SSE
/// (§6 "Adapter implementations are free to speak HTTP/SSE"), grounded on
/// `tandem-providers::OpenAICompatibleProvider`.
pub struct OpenAiCompatibleAdapter {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a bounded timeout");
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            client,
        }
    }

    fn wire_messages(&self, system: &str, user: &str, history: &[ChatTurn]) -> serde_json::Value {
        let mut messages = vec![json!({"role": "system", "content": system})];
        for turn in history {
            messages.push(json!({"role": turn.role, "content": turn.content}));
        }
        messages.push(json!({"role": "user", "content": user}));
        serde_json::Value::Array(messages)
    }

    fn request(&self, system: &str, user: &str, history: &[ChatTurn], max_tokens: u32, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": self.wire_messages(system, user, history),
            "max_tokens": max_tokens,
            "stream": stream,
        });
        let mut req = self.client.post(url).json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }
        req
    }
}

fn map_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(err.to_string())
    }
}

#[async_trait]
impl InferenceAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        history: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let resp = self
            .request(system, user, history, max_tokens, false)
            .send()
            .await
            .map_err(map_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let value: serde_json::Value = resp.json().await.map_err(map_transport)?;
        value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("no choices[0].message.content in response".to_string()))
    }

    async fn stream(
        &self,
        system: &str,
        user: &str,
        history: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<TextStream, ProviderError> {
        let resp = self
            .request(system, user, history, max_tokens, true)
            .send()
            .await
            .map_err(map_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = resp.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(map_transport)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                for frame in drain_frames(&mut buffer) {
                    for event in parse_frame(&frame)? {
                        match event {
                            SseEvent::Delta(text) => yield text,
                            SseEvent::Done => break 'outer,
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
