use convlog::config::parse::{parse_config_str, read_config_file, resolve_config, EnvOverrides};
use convlog::config::{generate::generate_starter_config, ConfigError, DisplayZone};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn env(vars: &[(&str, &str)]) -> EnvOverrides {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvOverrides::from_lookup(|name| map.get(name).cloned())
}

#[test]
fn test_generated_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, generate_starter_config()).unwrap();

    let file = read_config_file(&config_path).expect("Generated config should be valid");
    let config = resolve_config(file, &env(&[]), PathBuf::from("/unused")).unwrap();

    assert_eq!(config.sessions.pointer_key, "agent:main:main");
    assert_eq!(config.sessions.extension, "jsonl");
    assert_eq!(config.output.timezone, DisplayZone::Local);
    assert_eq!(config.poll.interval, Duration::from_secs(1));
    assert_eq!(config.poll.error_backoff, Duration::from_secs(5));
    assert_eq!(config.messages.max_length, 2000);
    assert!(config.messages.skip_patterns.iter().any(|p| p == "NO_REPLY"));
    assert!(config.state.path.ends_with("workspace/conversations/.state.json"));
}

#[test]
fn test_env_overrides_beat_file_values() {
    let file = parse_config_str(
        r#"
home: /srv/openclaw
output:
  timezone: utc
messages:
  max_length: 100
"#,
    )
    .unwrap();
    let overrides = env(&[
        ("OPENCLAW_TIMEZONE", "+05:30"),
        ("OPENCLAW_LOGGER_MAX_MESSAGE_LENGTH", "50"),
        ("OPENCLAW_LOGGER_POLL_SECONDS", "3"),
    ]);
    let config = resolve_config(file, &overrides, PathBuf::from("/unused")).unwrap();

    assert_eq!(config.sessions.dir, PathBuf::from("/srv/openclaw/agents/main/sessions"));
    assert_eq!(
        config.output.dir,
        PathBuf::from("/srv/openclaw/workspace/conversations")
    );
    assert_eq!(config.output.timezone, "+05:30".parse::<DisplayZone>().unwrap());
    assert_eq!(config.messages.max_length, 50);
    assert_eq!(config.poll.interval, Duration::from_secs(3));
}

#[test]
fn test_state_file_follows_conversations_dir() {
    let overrides = env(&[("OPENCLAW_CONVERSATIONS_DIR", "/data/logs")]);
    let config = resolve_config(Default::default(), &overrides, PathBuf::from("/home/u/.openclaw")).unwrap();

    assert_eq!(config.output.dir, PathBuf::from("/data/logs"));
    assert_eq!(config.state.path, PathBuf::from("/data/logs/.state.json"));
    assert_eq!(
        config.sessions.dir,
        PathBuf::from("/home/u/.openclaw/agents/main/sessions")
    );
}

#[test]
fn test_unknown_key_is_rejected() {
    let err = parse_config_str("sessions:\n  directory: /tmp\n").unwrap_err();
    assert!(matches!(err, ConfigError::YamlParse(_)));
}

#[test]
fn test_invalid_values_are_reported_together() {
    let file = parse_config_str(
        r#"
poll:
  interval: soon
messages:
  max_length: 0
"#,
    )
    .unwrap();
    let err = resolve_config(file, &env(&[]), PathBuf::from("/unused")).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("poll.interval"), "{}", message);
    assert!(message.contains("max_length"), "{}", message);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = read_config_file(&temp_dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
