use super::timestamp::parse_timestamp;
use super::{ParsedRecord, RecordParser, Role};
use crate::config::types::{DisplayZone, MessagesConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

const TRUNCATION_MARKER: &str = "\n\n[truncated]";

#[derive(Debug, Deserialize)]
struct TranscriptLine {
    #[serde(rename = "type")]
    kind: Option<String>,
    timestamp: Option<Value>,
    message: Option<TranscriptMessage>,
}

#[derive(Debug, Deserialize)]
struct TranscriptMessage {
    role: Option<String>,
    #[serde(default)]
    content: Value,
    timestamp: Option<Value>,
}

/// Parser for OpenClaw session transcripts (one JSON object per line).
#[derive(Debug, Clone)]
pub struct TranscriptParser {
    zone: DisplayZone,
    max_length: usize,
    skip_patterns: Vec<String>,
    user_label: String,
    assistant_label: String,
}

impl TranscriptParser {
    pub fn new(messages: &MessagesConfig, zone: DisplayZone) -> Self {
        Self {
            zone,
            max_length: messages.max_length,
            skip_patterns: messages.skip_patterns.clone(),
            user_label: messages.user_label.clone(),
            assistant_label: messages.assistant_label.clone(),
        }
    }

    fn is_skipped(&self, content: &str) -> bool {
        content.trim().is_empty() || self.skip_patterns.iter().any(|p| content.contains(p.as_str()))
    }

    fn label(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user_label,
            Role::Assistant => &self.assistant_label,
        }
    }
}

impl RecordParser for TranscriptParser {
    fn parse(&self, raw: &str) -> Option<ParsedRecord> {
        let line: TranscriptLine = match serde_json::from_str(raw) {
            Ok(line) => line,
            Err(e) => {
                trace!(error = %e, "Skipping line that is not a transcript entry");
                return None;
            }
        };

        if line.kind.as_deref() != Some("message") {
            return None;
        }
        let message = line.message?;
        let role = Role::from_wire(message.role.as_deref()?)?;

        let content = extract_text(&message.content);
        if self.is_skipped(&content) {
            return None;
        }

        let timestamp = line
            .timestamp
            .as_ref()
            .filter(|v| !v.is_null())
            .or(message.timestamp.as_ref().filter(|v| !v.is_null()))
            .and_then(|v| match parse_timestamp(v, &self.zone) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    trace!(error = %e, "Unparseable message timestamp, using current time");
                    None
                }
            })
            .unwrap_or_else(|| self.zone.now());

        Some(ParsedRecord {
            timestamp,
            role,
            role_label: self.label(role).to_string(),
            content: truncate(&content, self.max_length),
        })
    }
}

/// Flatten message content into plain text.
///
/// Block arrays keep only `text` blocks; thinking and tool blocks are dropped.
fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect(),
        Value::Null | Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}

/// Cut `content` to at most `max_chars` characters and mark the cut.
fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_idx, _)) => {
            let mut out = content[..byte_idx].trim_end().to_string();
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}
