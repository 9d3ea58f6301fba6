pub mod timestamp;
pub mod transcript;

use chrono::{DateTime, FixedOffset};
use std::fmt;

pub use transcript::TranscriptParser;

/// The two speakers that are written to the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn from_wire(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// A message worth logging, already filtered, truncated and labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub role: Role,
    pub role_label: String,
    pub content: String,
}

/// Turns one raw transcript line into a record, or skips it.
///
/// Implementations never fail: anything they cannot make sense of is a skip.
pub trait RecordParser {
    fn parse(&self, raw: &str) -> Option<ParsedRecord>;
}
