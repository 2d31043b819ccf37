use std::env;
use std::path::{Path, PathBuf};

// ── Defaults ────────────────────────────────────────────────────────────

/// Cursor endpoint reporting per-model request counts for the current month.
pub const DEFAULT_USAGE_URL: &str = "https://api2.cursor.sh/auth/usage";

/// Checkpoint directory used when neither the override nor the executable
/// location can be resolved.
const FALLBACK_STATE_DIR_REL: &str = ".cursor-efficiency";

// ── Config struct ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct EfficiencyConfig {
    /// Cursor `User` directory. `None` means derive it from the host OS.
    pub cursor_user_dir: Option<PathBuf>,
    /// Root under which per-directory checkpoint files live.
    pub state_dir: PathBuf,
    pub usage_url: String,
    pub fetch_usage: bool,
}

impl EfficiencyConfig {
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_default();

        Self {
            cursor_user_dir: env_opt_path("CURSOR_EFFICIENCY_USER_DIR", &home),
            state_dir: env_opt_path("CURSOR_EFFICIENCY_STATE_DIR", &home)
                .unwrap_or_else(|| default_state_dir(&home)),
            usage_url: env_string("CURSOR_EFFICIENCY_USAGE_URL", DEFAULT_USAGE_URL),
            fetch_usage: env_bool("CURSOR_EFFICIENCY_FETCH_USAGE", true),
        }
    }
}

/// Checkpoints sit next to the installed tool, keyed by directory name.
fn default_state_dir(home: &Path) -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| home.join(FALLBACK_STATE_DIR_REL))
}

fn env_opt_path(key: &str, home: &Path) -> Option<PathBuf> {
    match env::var(key) {
        Ok(val) if !val.trim().is_empty() => Some(expand_tilde(val.trim(), home)),
        _ => None,
    }
}

fn env_string(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn expand_tilde(input: &str, home: &Path) -> PathBuf {
    if let Some(rest) = input.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(input)
}
