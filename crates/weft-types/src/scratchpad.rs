/// Strips reserved scratch-pad regions (`<think>...</think>`,
/// case-insensitive) from model output before it is parsed or persisted
/// (§7). Used by the planner, merger, memory writer, and tool-call parser —
/// kept here rather than in any one of those crates since all four need it
/// and none of them should depend on each other for it.
pub fn strip_scratchpad(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(text.len());
    let lower = text.to_ascii_lowercase();
    let mut cursor = 0usize;

    loop {
        let Some(open_rel) = lower[cursor..].find(OPEN) else {
            out.push_str(&text[cursor..]);
            break;
        };
        let open_abs = cursor + open_rel;
        out.push_str(&text[cursor..open_abs]);

        match lower[open_abs..].find(CLOSE) {
            Some(close_rel) => {
                cursor = open_abs + close_rel + CLOSE.len();
            }
            None => {
                // Unterminated scratch-pad: drop the remainder entirely.
                cursor = text.len();
                break;
            }
        }
    }

    out
}

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Streaming counterpart to [`strip_scratchpad`]: elides scratch-pad
/// regions from a chunk-by-chunk model stream (§4.E "Streaming passthrough"
/// — elided on a character-by-character basis), holding back only the
/// minimum trailing bytes that could still be the start of `<think>` when a
/// chunk boundary splits a marker.
pub struct ScratchpadFilter {
    in_scratchpad: bool,
    pending: String,
}

impl ScratchpadFilter {
    pub fn new() -> Self {
        Self {
            in_scratchpad: false,
            pending: String::new(),
        }
    }

    /// Feeds the next chunk, returning the portion now safe to forward.
    pub fn feed(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut output = String::new();

        loop {
            if self.in_scratchpad {
                let lower = self.pending.to_ascii_lowercase();
                match lower.find(CLOSE_TAG) {
                    Some(pos) => {
                        self.pending.drain(..pos + CLOSE_TAG.len());
                        self.in_scratchpad = false;
                    }
                    None => break,
                }
            } else {
                let lower = self.pending.to_ascii_lowercase();
                match lower.find(OPEN_TAG) {
                    Some(pos) => {
                        output.push_str(&self.pending[..pos]);
                        self.pending.drain(..pos + OPEN_TAG.len());
                        self.in_scratchpad = true;
                    }
                    None => {
                        let hold = partial_suffix_match_len(&lower, OPEN_TAG);
                        let safe_len = self.pending.len() - hold;
                        output.push_str(&self.pending[..safe_len]);
                        self.pending.drain(..safe_len);
                        break;
                    }
                }
            }
        }

        output
    }

    /// Flushes any remaining buffered text at end-of-stream. Text still
    /// inside an unterminated scratch-pad region is dropped, matching
    /// [`strip_scratchpad`]'s handling of an unterminated region.
    pub fn finish(mut self) -> String {
        if self.in_scratchpad {
            String::new()
        } else {
            std::mem::take(&mut self.pending)
        }
    }
}

impl Default for ScratchpadFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn partial_suffix_match_len(haystack_lower: &str, needle: &str) -> usize {
    let max = needle.len().min(haystack_lower.len());
    for len in (1..=max).rev() {
        if haystack_lower.ends_with(&needle[..len]) {
            return len;
        }
    }
    0
}
