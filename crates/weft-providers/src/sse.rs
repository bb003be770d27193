use serde_json::Value;

use crate::adapter::ProviderError;

/// Splits accumulated SSE bytes into complete frames on a blank-line
/// boundary, leaving any trailing partial frame in `buffer` (matching
/// `tandem-providers::OpenAICompatibleProvider::stream`'s `"\n\n"`-splitting
/// loop).
pub fn drain_frames(buffer: &mut String) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let frame = buffer[..pos].to_string();
        buffer.drain(..pos + 2);
        frames.push(frame);
    }
    frames
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Parses one SSE frame into zero or more deltas plus an optional terminal
/// `Done` marker, following the `data: `-prefixed single-line-per-event
/// shape and `[DONE]` sentinel shared by `tandem-providers` and `GoldBot`'s
/// `provider_glm::handle_sse_frame`.
pub fn parse_frame(frame: &str) -> Result<Vec<SseEvent>, ProviderError> {
    let mut events = Vec::new();
    for raw_line in frame.lines() {
        let line = raw_line.trim_end_matches('\r');
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }
        if payload == "[DONE]" {
            events.push(SseEvent::Done);
            continue;
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Malformed(format!("invalid SSE JSON payload: {e}")))?;

        if let Some(detail) = extract_error(&value) {
            return Err(ProviderError::Malformed(detail));
        }

        let choices = value
            .get("choices")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for choice in choices {
            let delta = choice.get("delta").cloned().unwrap_or_default();
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(SseEvent::Delta(text.to_string()));
                }
            }
        }
    }
    Ok(events)
}

fn extract_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("message").and_then(Value::as_str).or(e.as_str()))
        .map(|s| s.to_string())
}
