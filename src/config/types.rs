use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    "HEARTBEAT",
    "Read HEARTBEAT.md",
    "GatewayRestart",
    "Exec failed",
    "Pre-compaction memory flush",
    "NO_REPLY",
    "HEARTBEAT_OK",
];

/// Fully resolved runtime configuration.
///
/// Built once at startup by [`crate::config::load_config`] and handed to each
/// component by reference. Nothing below the CLI layer reads the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sessions: SessionsConfig,
    pub output: OutputConfig,
    pub state: StateConfig,
    pub poll: PollConfig,
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding the session transcript files
    pub dir: PathBuf,
    /// Manifest inside `dir` that names the current session
    pub pointer_file: String,
    /// Key inside the manifest whose `sessionId` is followed
    pub pointer_key: String,
    pub fallback_session_id: Option<String>,
    pub extension: String,
    /// Files whose name contains this marker are never candidates
    pub deleted_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub timezone: DisplayZone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(with = "duration_format")]
    pub interval: Duration,
    #[serde(with = "duration_format")]
    pub error_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Maximum rendered length in characters
    pub max_length: usize,
    pub skip_patterns: Vec<String>,
    pub user_label: String,
    pub assistant_label: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            max_length: 2000,
            skip_patterns: DEFAULT_SKIP_PATTERNS.iter().map(|s| s.to_string()).collect(),
            user_label: "User".to_string(),
            assistant_label: "Assistant".to_string(),
        }
    }
}

impl Config {
    /// Defaults rooted at an OpenClaw home directory (normally `~/.openclaw`).
    pub fn with_home(home: PathBuf) -> Self {
        let workspace = home.join("workspace");
        let conversations = workspace.join("conversations");
        Self {
            sessions: SessionsConfig {
                dir: home.join("agents").join("main").join("sessions"),
                pointer_file: "sessions.json".to_string(),
                pointer_key: "agent:main:main".to_string(),
                fallback_session_id: None,
                extension: "jsonl".to_string(),
                deleted_marker: ".deleted.".to_string(),
            },
            state: StateConfig {
                path: conversations.join(".state.json"),
            },
            output: OutputConfig {
                dir: conversations,
                timezone: DisplayZone::Local,
            },
            poll: PollConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

/// Time zone used to date daily files and stamp entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    /// The system zone at the time of conversion
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
    /// IANA zone such as `Europe/Berlin`, with its DST rules
    Named(Tz),
}

#[derive(Debug, thiserror::Error)]
#[error("invalid timezone '{0}': expected 'local', 'utc', an offset such as '+02:00' or a zone name such as 'Europe/Berlin'")]
pub struct InvalidZone(pub String);

impl DisplayZone {
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.convert(Utc::now())
    }

    pub fn convert<Tz: TimeZone>(&self, instant: DateTime<Tz>) -> DateTime<FixedOffset> {
        match self {
            DisplayZone::Local => instant.with_timezone(&Local).fixed_offset(),
            DisplayZone::Utc => instant.with_timezone(&Utc).fixed_offset(),
            DisplayZone::Fixed(offset) => instant.with_timezone(offset),
            DisplayZone::Named(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }

    /// Interpret a wall-clock time that carries no offset as being in this zone.
    pub fn from_naive(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            DisplayZone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            DisplayZone::Utc => Some(Utc.from_utc_datetime(&naive).fixed_offset()),
            DisplayZone::Fixed(offset) => offset.from_local_datetime(&naive).single(),
            // A wall time skipped by a DST jump has no instant; repeated ones take the first
            DisplayZone::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
        }
    }
}

impl FromStr for DisplayZone {
    type Err = InvalidZone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "local" => return Ok(DisplayZone::Local),
            "utc" | "z" | "etc/utc" => return Ok(DisplayZone::Utc),
            _ => {}
        }

        if trimmed.starts_with(['+', '-']) {
            // chrono parses offsets as part of a timestamp, so borrow a fixed date
            let stamp = format!("2000-01-01T00:00:00{}", trimmed);
            return DateTime::parse_from_rfc3339(&stamp)
                .map(|dt| {
                    let offset = dt.offset().fix();
                    if offset.local_minus_utc() == 0 {
                        DisplayZone::Utc
                    } else {
                        DisplayZone::Fixed(offset)
                    }
                })
                .map_err(|_| InvalidZone(s.to_string()));
        }

        trimmed
            .parse::<Tz>()
            .map(DisplayZone::Named)
            .map_err(|_| InvalidZone(s.to_string()))
    }
}

impl fmt::Display for DisplayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayZone::Local => f.write_str("local"),
            DisplayZone::Utc => f.write_str("utc"),
            DisplayZone::Fixed(offset) => write!(f, "{}", offset),
            DisplayZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl Serialize for DisplayZone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DisplayZone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Durations written as a whole number and a unit: `500ms`, `1s`, `2m`, `1h`.
pub(crate) mod duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Suffix and its length in milliseconds. `ms` must precede `m` and `s`.
    const UNITS: &[(&str, u64)] = &[("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (number, unit_ms) = UNITS
            .iter()
            .find_map(|(suffix, ms)| s.strip_suffix(suffix).map(|n| (n.trim(), *ms)))
            .ok_or_else(|| format!("invalid duration '{}': expected a number followed by ms, s, m or h", s))?;

        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}': '{}' is not a whole number", s, number))?;

        value
            .checked_mul(unit_ms)
            .map(Duration::from_millis)
            .ok_or_else(|| format!("duration too large: {}", s))
    }

    /// Largest unit that represents `d` exactly, at millisecond precision.
    pub fn format_duration(d: Duration) -> String {
        let ms = d.as_millis();
        UNITS
            .iter()
            .rev()
            .find(|(_, unit_ms)| ms > 0 && ms % u128::from(*unit_ms) == 0)
            .map(|(suffix, unit_ms)| format!("{}{}", ms / u128::from(*unit_ms), suffix))
            .unwrap_or_else(|| format!("{}ms", ms))
    }
}

#[cfg(test)]
mod tests {
    use super::duration_format::{format_duration, parse_duration};
    use super::*;

    #[test]
    fn test_zone_parsing() {
        assert_eq!("local".parse::<DisplayZone>().unwrap(), DisplayZone::Local);
        assert_eq!("UTC".parse::<DisplayZone>().unwrap(), DisplayZone::Utc);
        assert_eq!("+00:00".parse::<DisplayZone>().unwrap(), DisplayZone::Utc);

        let zone = "+05:30".parse::<DisplayZone>().unwrap();
        assert_eq!(
            zone,
            DisplayZone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(zone.to_string(), "+05:30");
    }

    #[test]
    fn test_named_zone_follows_dst() {
        let zone = "Europe/Berlin".parse::<DisplayZone>().unwrap();
        assert_eq!(zone, DisplayZone::Named(chrono_tz::Europe::Berlin));
        assert_eq!(zone.to_string(), "Europe/Berlin");

        // Winter is +01:00, summer +02:00, which moves a late entry to the next day
        let winter = zone.convert(DateTime::parse_from_rfc3339("2026-01-15T22:30:00Z").unwrap());
        assert_eq!(winter.format("%Y-%m-%d %H:%M").to_string(), "2026-01-15 23:30");
        let summer = zone.convert(DateTime::parse_from_rfc3339("2026-07-15T22:30:00Z").unwrap());
        assert_eq!(summer.format("%Y-%m-%d %H:%M").to_string(), "2026-07-16 00:30");

        let naive = NaiveDateTime::parse_from_str("2026-07-15 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(zone.from_naive(naive).unwrap().offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn test_zone_rejects_garbage() {
        assert!("Mars/Olympus".parse::<DisplayZone>().is_err());
        assert!("+25:00".parse::<DisplayZone>().is_err());
    }

    #[test]
    fn test_fixed_zone_conversion() {
        let zone = DisplayZone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap());
        let utc = DateTime::parse_from_rfc3339("2026-01-02T03:30:00Z").unwrap();
        let converted = zone.convert(utc);
        assert_eq!(converted.format("%Y-%m-%d %H:%M").to_string(), "2026-01-01 22:30");
    }

    #[test]
    fn test_duration_round_trip_formats() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_oversized_duration_is_an_error() {
        let err = parse_duration(&format!("{}h", u64::MAX / 60)).unwrap_err();
        assert!(err.contains("too large"), "{}", err);
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX / 1000)).is_ok());
    }

    #[test]
    fn test_defaults_derive_from_home() {
        let config = Config::with_home(PathBuf::from("/home/u/.openclaw"));
        assert_eq!(
            config.sessions.dir,
            PathBuf::from("/home/u/.openclaw/agents/main/sessions")
        );
        assert_eq!(
            config.state.path,
            PathBuf::from("/home/u/.openclaw/workspace/conversations/.state.json")
        );
        assert_eq!(config.messages.skip_patterns.len(), DEFAULT_SKIP_PATTERNS.len());
    }
}
