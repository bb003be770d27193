use serde_json::Value;

/// Result of scanning one turn's accumulated output for a protocol marker
/// (§4.E).
#[derive(Debug, Clone, PartialEq)]
pub enum TurnMarker {
    ActionCall { name: String, arguments: Value },
    FinalAnswer(String),
    /// Neither marker recognized but non-marker prose exists — treated as a
    /// final answer by the caller per §4.E ambiguity rule.
    Prose(String),
    /// Neither marker nor any prose — reprompt with a clarification.
    Empty,
}

const ACTION_PREFIX: &str = "Action: ";
const FINAL_PREFIX: &str = "Final Answer: ";

/// Scans `text` line by line for `Action: {...}` / `Final Answer: ...`
/// markers, preferring the last well-formed match over the first — the
/// same last-match-wins policy as `GoldBot`'s `extract_last_tag` /
/// `parse_llm_response`, adapted to this protocol's line-prefixed marker
/// grammar instead of XML-style tags.
pub fn parse_turn(text: &str) -> TurnMarker {
    let mut last_action: Option<(String, Value)> = None;
    let mut last_final: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(ACTION_PREFIX) {
            if let Ok(value) = serde_json::from_str::<Value>(rest) {
                let name = value.get("name").and_then(Value::as_str).map(str::to_string);
                let arguments = value.get("arguments").cloned().unwrap_or(Value::Null);
                if let Some(name) = name {
                    last_action = Some((name, arguments));
                }
            }
        } else if let Some(rest) = trimmed.strip_prefix(FINAL_PREFIX) {
            last_final = Some(rest.to_string());
        }
    }

    match (last_action, last_final) {
        (Some(_), Some(final_answer)) => {
            // Both present: §4.E treats this as ambiguous, resolved by
            // preferring the final answer if non-marker prose exists.
            if has_non_marker_prose(text) {
                TurnMarker::Prose(final_answer)
            } else {
                TurnMarker::Empty
            }
        }
        (Some((name, arguments)), None) => TurnMarker::ActionCall { name, arguments },
        (None, Some(final_answer)) => TurnMarker::FinalAnswer(final_answer),
        (None, None) => {
            if has_non_marker_prose(text) {
                TurnMarker::Prose(text.trim().to_string())
            } else {
                TurnMarker::Empty
            }
        }
    }
}

fn has_non_marker_prose(text: &str) -> bool {
    text.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty()
            && !trimmed.starts_with(ACTION_PREFIX)
            && !trimmed.starts_with(FINAL_PREFIX)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_action_marker() {
        let text = r#"Action: {"name":"read_file","arguments":{"path":"/tmp/x"}}"#;
        let marker = parse_turn(text);
        assert_eq!(
            marker,
            TurnMarker::ActionCall {
                name: "read_file".to_string(),
                arguments: json!({"path": "/tmp/x"}),
            }
        );
    }

    #[test]
    fn parses_final_answer_marker() {
        let text = "Final Answer: the result is done";
        assert_eq!(
            parse_turn(text),
            TurnMarker::FinalAnswer("the result is done".to_string())
        );
    }

    #[test]
    fn empty_output_yields_empty_marker() {
        assert_eq!(parse_turn(""), TurnMarker::Empty);
    }

    #[test]
    fn unrecognized_prose_becomes_prose_marker() {
        let text = "I am thinking about this.";
        assert_eq!(parse_turn(text), TurnMarker::Prose(text.to_string()));
    }

    #[test]
    fn last_action_marker_wins_over_earlier_ones() {
        let text = "Action: {\"name\":\"a\",\"arguments\":{}}\nAction: {\"name\":\"b\",\"arguments\":{}}";
        assert_eq!(
            parse_turn(text),
            TurnMarker::ActionCall {
                name: "b".to_string(),
                arguments: json!({}),
            }
        );
    }
}
