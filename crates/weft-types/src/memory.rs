use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Header block of a persisted memory record (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecordHeader {
    pub agent_display_name: String,
    pub agent_key: String,
    pub workspace: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// A single user/assistant exchange rendered to a plain-text document
/// (§3, §6). `render`/`parse` are exact inverses for any record whose turn
/// text contains no line equal to the bare `---` delimiter — the same
/// constraint the wire format itself implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub header: MemoryRecordHeader,
    pub system_prompt: String,
    pub user_turn: String,
    pub assistant_turn: String,
}

#[derive(Debug, Error)]
pub enum MemoryRecordError {
    #[error("truncated memory record: expected {0}")]
    Truncated(&'static str),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

const DELIM: &str = "---";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

impl MemoryRecord {
    pub fn render(&self) -> String {
        format!(
            "{delim}\nAgent: {agent}\nAgentKey: {key}\nWorkspace: {ws}\nTimestamp: {ts}\nTags: {tags}\n{delim}\nSystem Prompt:\n{system}\n{delim}\nUser:\n{user}\n{delim}\nSelfAI:\n{assistant}\n",
            delim = DELIM,
            agent = self.header.agent_display_name,
            key = self.header.agent_key,
            ws = self.header.workspace,
            ts = self.header.timestamp.format(TIMESTAMP_FMT),
            tags = self.header.tags.join(","),
            system = self.system_prompt,
            user = self.user_turn,
            assistant = self.assistant_turn,
        )
    }

    pub fn parse(text: &str) -> Result<Self, MemoryRecordError> {
        let mut lines = text.lines();

        expect_delim(&mut lines)?;

        let mut agent_display_name = None;
        let mut agent_key = None;
        let mut workspace = None;
        let mut timestamp = None;
        let mut tags = Vec::new();

        loop {
            let line = lines
                .next()
                .ok_or(MemoryRecordError::Truncated("header section"))?;
            if line == DELIM {
                break;
            }
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| MemoryRecordError::MalformedHeader(line.to_string()))?;
            match key {
                "Agent" => agent_display_name = Some(value.to_string()),
                "AgentKey" => agent_key = Some(value.to_string()),
                "Workspace" => workspace = Some(value.to_string()),
                "Timestamp" => {
                    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FMT)
                        .map_err(|e| MemoryRecordError::InvalidTimestamp(e.to_string()))?;
                    timestamp = Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
                }
                "Tags" => {
                    tags = if value.is_empty() {
                        Vec::new()
                    } else {
                        value.split(',').map(|s| s.to_string()).collect()
                    };
                }
                other => return Err(MemoryRecordError::MalformedHeader(other.to_string())),
            }
        }

        let header = MemoryRecordHeader {
            agent_display_name: agent_display_name
                .ok_or(MemoryRecordError::Truncated("Agent header field"))?,
            agent_key: agent_key.ok_or(MemoryRecordError::Truncated("AgentKey header field"))?,
            workspace: workspace.ok_or(MemoryRecordError::Truncated("Workspace header field"))?,
            timestamp: timestamp.ok_or(MemoryRecordError::Truncated("Timestamp header field"))?,
            tags,
        };

        expect_line(&mut lines, "System Prompt:")?;
        let system_prompt = read_section_until_delim(&mut lines)?;

        expect_line(&mut lines, "User:")?;
        let user_turn = read_section_until_delim(&mut lines)?;

        expect_line(&mut lines, "SelfAI:")?;
        let assistant_turn: String = lines.collect::<Vec<_>>().join("\n");

        Ok(MemoryRecord {
            header,
            system_prompt,
            user_turn,
            assistant_turn,
        })
    }
}

fn expect_delim<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<(), MemoryRecordError> {
    expect_line(lines, DELIM)
}

fn expect_line<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    expected: &'static str,
) -> Result<(), MemoryRecordError> {
    match lines.next() {
        Some(line) if line == expected => Ok(()),
        Some(other) => Err(MemoryRecordError::MalformedHeader(other.to_string())),
        None => Err(MemoryRecordError::Truncated(expected)),
    }
}

fn read_section_until_delim<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<String, MemoryRecordError> {
    let mut collected = Vec::new();
    loop {
        match lines.next() {
            Some(DELIM) => break,
            Some(line) => collected.push(line),
            None => return Err(MemoryRecordError::Truncated("section delimiter")),
        }
    }
    Ok(collected.join("\n"))
}
