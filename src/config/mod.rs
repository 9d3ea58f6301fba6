pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, ConfigError};
pub use types::{Config, DisplayZone};

const USER_CONFIG: &str = ".config/convlog/config.yml";
const SYSTEM_CONFIG: &str = "/etc/convlog/config.yml";

/// `$env{NAME}`, where NAME is a C-style identifier.
pub(crate) fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern is valid")
    })
}

/// Replace `$env{NAME}` references with values from the process environment.
/// Unset names stay as written so validation can report them.
pub fn expand_env_vars(text: &str) -> String {
    expand_with(text, |name| std::env::var(name).ok())
}

fn expand_with(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    env_var_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    expand_tilde_in(path, dirs::home_dir().as_deref())
}

fn expand_tilde_in(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Pick the config file: an explicit `--config` path as given, otherwise the
/// first of `~/.config/convlog/config.yml` and `/etc/convlog/config.yml` that
/// exists. `None` means run on defaults and environment alone.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    dirs::home_dir()
        .map(|home| home.join(USER_CONFIG))
        .into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG)))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "OPENCLAW_ROOT" => Some("/srv/openclaw".to_string()),
            "AGENT" => Some("main".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_env_references_expand_in_config_text() {
        let text = "home: $env{OPENCLAW_ROOT}\nsessions:\n  dir: $env{OPENCLAW_ROOT}/agents/$env{AGENT}/sessions\n";
        assert_eq!(
            expand_with(text, lookup),
            "home: /srv/openclaw\nsessions:\n  dir: /srv/openclaw/agents/main/sessions\n"
        );
    }

    #[test]
    fn test_unset_and_shell_style_references_are_left_alone() {
        assert_eq!(
            expand_with("state: $env{CONVLOG_STATE}/x", lookup),
            "state: $env{CONVLOG_STATE}/x"
        );
        assert_eq!(expand_with("${OPENCLAW_ROOT}/x", lookup), "${OPENCLAW_ROOT}/x");
        assert_eq!(expand_with("$env{1BAD}", lookup), "$env{1BAD}");
    }

    #[test]
    fn test_tilde_expands_only_as_leading_component() {
        let home = Path::new("/home/u");
        assert_eq!(
            expand_tilde_in(Path::new("~/.openclaw/workspace"), Some(home)),
            PathBuf::from("/home/u/.openclaw/workspace")
        );
        assert_eq!(expand_tilde_in(Path::new("~"), Some(home)), PathBuf::from("/home/u"));
        assert_eq!(
            expand_tilde_in(Path::new("~other/.openclaw"), Some(home)),
            PathBuf::from("~other/.openclaw")
        );
        assert_eq!(
            expand_tilde_in(Path::new("/data/~/x"), Some(home)),
            PathBuf::from("/data/~/x")
        );
        assert_eq!(
            expand_tilde_in(Path::new("~/.openclaw"), None),
            PathBuf::from("~/.openclaw")
        );
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let resolved = resolve_config_path(Some(Path::new("/tmp/convlog.yml")));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/convlog.yml")));
    }
}
