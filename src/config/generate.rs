pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# CONVLOG CONFIGURATION
# =============================================================================
# convlog tails the active OpenClaw session transcript and appends each user
# and assistant message to a daily markdown file.
#
# Every key below is optional. Values are resolved in this order, later
# entries winning:
#   1. Built-in defaults rooted at ~/.openclaw
#   2. This file
#   3. OPENCLAW_* environment variables
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/convlog/config.yml
#   3. /etc/convlog/config.yml
#
# Environment variables may be referenced as $env{NAME}.

# OpenClaw home; the defaults below hang off it (OPENCLAW_HOME)
home: ~/.openclaw
# Workspace directory (OPENCLAW_WORKSPACE)
workspace: ~/.openclaw/workspace

# =============================================================================
# SESSIONS
# =============================================================================
# Where transcripts live and how the active one is chosen:
#   1. the manifest entry named by pointer_key
#   2. fallback_session_id, if that file exists
#   3. the most recently modified transcript

sessions:
  # OPENCLAW_SESSIONS_DIR
  dir: ~/.openclaw/agents/main/sessions
  pointer_file: sessions.json
  pointer_key: "agent:main:main"
  # OPENCLAW_MAIN_SESSION_ID
  # fallback_session_id: 00000000-0000-0000-0000-000000000000
  extension: jsonl
  deleted_marker: ".deleted."

# =============================================================================
# OUTPUT
# =============================================================================

output:
  # One YYYY-MM-DD.md file per day (OPENCLAW_CONVERSATIONS_DIR)
  dir: ~/.openclaw/workspace/conversations
  # 'local', 'utc', a fixed offset such as '+02:00' or a zone name such as
  # 'Europe/Berlin' (OPENCLAW_TIMEZONE)
  timezone: local

# =============================================================================
# STATE
# =============================================================================

state:
  # Per-transcript byte offsets (OPENCLAW_CONVERSATION_STATE_FILE)
  path: ~/.openclaw/workspace/conversations/.state.json

# =============================================================================
# POLLING
# =============================================================================

poll:
  # OPENCLAW_LOGGER_POLL_SECONDS
  interval: 1s
  # Wait after a failed poll before trying again; defaults to the larger of
  # 5s and the poll interval
  error_backoff: 5s

# =============================================================================
# MESSAGES
# =============================================================================

messages:
  # Longer messages are cut and marked [truncated]
  # (OPENCLAW_LOGGER_MAX_MESSAGE_LENGTH)
  max_length: 2000
  # Messages containing any of these are not logged
  skip_patterns:
    - HEARTBEAT
    - Read HEARTBEAT.md
    - GatewayRestart
    - Exec failed
    - Pre-compaction memory flush
    - NO_REPLY
    - HEARTBEAT_OK
  user_label: User
  assistant_label: Assistant
"#
    .to_string()
}
