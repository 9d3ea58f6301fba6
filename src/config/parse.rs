use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars, expand_tilde};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("could not determine home directory; set OPENCLAW_HOME")]
    NoHomeDir,
}

/// On-disk shape of the config file. Every key is optional; missing keys fall
/// back to the environment or to defaults derived from the OpenClaw home.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub home: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub sessions: FileSessions,
    #[serde(default)]
    pub output: FileOutput,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub poll: FilePoll,
    #[serde(default)]
    pub messages: FileMessages,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSessions {
    pub dir: Option<PathBuf>,
    pub pointer_file: Option<String>,
    pub pointer_key: Option<String>,
    pub fallback_session_id: Option<String>,
    pub extension: Option<String>,
    pub deleted_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileOutput {
    pub dir: Option<PathBuf>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileState {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilePoll {
    pub interval: Option<String>,
    pub error_backoff: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMessages {
    pub max_length: Option<usize>,
    pub skip_patterns: Option<Vec<String>>,
    pub user_label: Option<String>,
    pub assistant_label: Option<String>,
}

/// Environment variables recognised as overrides, highest precedence.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub sessions_dir: Option<PathBuf>,
    pub conversations_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub main_session_id: Option<String>,
    pub timezone: Option<String>,
    pub poll_seconds: Option<String>,
    pub max_message_length: Option<String>,
}

impl EnvOverrides {
    /// Collect overrides through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let path = |name: &str| get(name).map(|v| expand_tilde(Path::new(&v)));

        Self {
            home: path("OPENCLAW_HOME"),
            workspace: path("OPENCLAW_WORKSPACE"),
            sessions_dir: path("OPENCLAW_SESSIONS_DIR"),
            conversations_dir: path("OPENCLAW_CONVERSATIONS_DIR"),
            state_file: path("OPENCLAW_CONVERSATION_STATE_FILE"),
            main_session_id: get("OPENCLAW_MAIN_SESSION_ID"),
            timezone: get("OPENCLAW_TIMEZONE"),
            poll_seconds: get("OPENCLAW_LOGGER_POLL_SECONDS"),
            max_message_length: get("OPENCLAW_LOGGER_MAX_MESSAGE_LENGTH"),
        }
    }

    pub fn from_process_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Load configuration from an optional YAML file, the process environment and
/// the user's home directory.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => read_config_file(path)?,
        None => FileConfig::default(),
    };
    let env = EnvOverrides::from_process_env();

    // A missing home directory only matters when nothing else names one
    let default_home = match dirs::home_dir() {
        Some(home) => home.join(".openclaw"),
        None if env.home.is_some() || file.home.is_some() => PathBuf::new(),
        None => return Err(ConfigError::NoHomeDir),
    };

    resolve_config(file, &env, default_home)
}

/// Read and parse a config file after expanding `$env{VAR}` references.
pub fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

pub fn parse_config_str(yaml: &str) -> Result<FileConfig, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    // An empty document (or one holding only comments) is a valid, empty config
    if yaml_string.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with('#')
    }) {
        return Ok(FileConfig::default());
    }

    Ok(serde_yaml::from_str(&yaml_string)?)
}

/// Layer defaults, file values and environment overrides into a [`Config`].
///
/// Paths that are derived from another path (the workspace from the home, the
/// conversations directory from the workspace, the state file from the
/// conversations directory) follow their parent unless set explicitly.
pub fn resolve_config(
    file: FileConfig,
    env: &EnvOverrides,
    default_home: PathBuf,
) -> Result<Config, ConfigError> {
    let pick_path = |env: &Option<PathBuf>, file: Option<PathBuf>| {
        env.clone().or_else(|| file.map(|p| expand_tilde(&p)))
    };

    let home = pick_path(&env.home, file.home).unwrap_or(default_home);
    let workspace = pick_path(&env.workspace, file.workspace).unwrap_or_else(|| home.join("workspace"));

    let mut config = Config::with_home(home);
    let mut errors = Vec::new();

    let sessions = file.sessions;
    if let Some(dir) = pick_path(&env.sessions_dir, sessions.dir) {
        config.sessions.dir = dir;
    }
    if let Some(v) = sessions.pointer_file {
        config.sessions.pointer_file = v;
    }
    if let Some(v) = sessions.pointer_key {
        config.sessions.pointer_key = v;
    }
    if let Some(v) = sessions.extension {
        config.sessions.extension = v.trim_start_matches('.').to_string();
    }
    if let Some(v) = sessions.deleted_marker {
        config.sessions.deleted_marker = v;
    }
    config.sessions.fallback_session_id = env
        .main_session_id
        .clone()
        .or(sessions.fallback_session_id)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let output = file.output;
    config.output.dir = pick_path(&env.conversations_dir, output.dir)
        .unwrap_or_else(|| workspace.join("conversations"));
    if let Some(tz) = env.timezone.clone().or(output.timezone) {
        config.output.timezone = match tz.parse::<DisplayZone>() {
            Ok(zone) => zone,
            Err(e) => {
                warn!(error = %e, "Falling back to system timezone");
                DisplayZone::Local
            }
        };
    }

    config.state.path = pick_path(&env.state_file, file.state.path)
        .unwrap_or_else(|| config.output.dir.join(".state.json"));

    let poll = file.poll;
    if let Some(v) = poll.interval {
        match duration_format::parse_duration(&v) {
            Ok(d) => config.poll.interval = d,
            Err(e) => errors.push(format!("poll.interval: {}", e)),
        }
    }
    let mut explicit_backoff = None;
    if let Some(v) = poll.error_backoff {
        match duration_format::parse_duration(&v) {
            Ok(d) => explicit_backoff = Some(d),
            Err(e) => errors.push(format!("poll.error_backoff: {}", e)),
        }
    }
    if let Some(v) = &env.poll_seconds {
        match v.parse::<f64>().ok().filter(|secs| *secs > 0.0) {
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(d) => config.poll.interval = d,
                Err(_) => errors.push(format!("OPENCLAW_LOGGER_POLL_SECONDS: value '{}' is too large", v)),
            },
            None => errors.push(format!("OPENCLAW_LOGGER_POLL_SECONDS: invalid value '{}'", v)),
        }
    }
    // Without an explicit backoff, never back off for less than one poll interval
    config.poll.error_backoff = explicit_backoff
        .unwrap_or_else(|| config.poll.error_backoff.max(config.poll.interval));

    let messages = file.messages;
    if let Some(v) = messages.max_length {
        config.messages.max_length = v;
    }
    if let Some(v) = &env.max_message_length {
        match v.parse::<usize>() {
            Ok(n) => config.messages.max_length = n,
            Err(_) => errors.push(format!(
                "OPENCLAW_LOGGER_MAX_MESSAGE_LENGTH: invalid value '{}'",
                v
            )),
        }
    }
    if let Some(v) = messages.skip_patterns {
        config.messages.skip_patterns = v;
    }
    if let Some(v) = messages.user_label {
        config.messages.user_label = v;
    }
    if let Some(v) = messages.assistant_label {
        config.messages.assistant_label = v;
    }

    validate_config(&config, &mut errors);

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=/path/to/directory\n\
             2. Replace $env{{{0}}} in the config file with an actual path",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn validate_config(config: &Config, errors: &mut Vec<String>) {
    if config.poll.interval.is_zero() {
        errors.push("poll.interval must be greater than zero".to_string());
    }
    if config.poll.error_backoff < config.poll.interval {
        errors.push(format!(
            "poll.error_backoff ({:?}) must not be shorter than poll.interval ({:?})",
            config.poll.error_backoff, config.poll.interval
        ));
    }
    if config.messages.max_length == 0 {
        errors.push("messages.max_length must be greater than zero".to_string());
    }
    if config.messages.user_label.trim().is_empty() {
        errors.push("messages.user_label must not be empty".to_string());
    }
    if config.messages.assistant_label.trim().is_empty() {
        errors.push("messages.assistant_label must not be empty".to_string());
    }
    if config.messages.skip_patterns.iter().any(|p| p.is_empty()) {
        errors.push("messages.skip_patterns must not contain empty patterns".to_string());
    }
    if config.sessions.extension.is_empty() {
        errors.push("sessions.extension must not be empty".to_string());
    }
    if config.sessions.pointer_key.is_empty() {
        errors.push("sessions.pointer_key must not be empty".to_string());
    }
    if config.sessions.pointer_file.is_empty() {
        errors.push("sessions.pointer_file must not be empty".to_string());
    }
    if config.sessions.deleted_marker.is_empty() {
        errors.push("sessions.deleted_marker must not be empty".to_string());
    }
    if config.state.path.as_os_str().is_empty() {
        errors.push("state.path must not be empty".to_string());
    }
}
