use efl_core::GatePolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server binds (default: 0.0.0.0:8000).
    pub listen_addr: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Base URL of the face descriptor service.
    pub encoder_url: String,
    pub encoder_timeout: Duration,
    /// Cosine similarity threshold for a positive match.
    pub match_threshold: f32,
    /// Minimum gap between two processed camera frames.
    pub frame_interval: Duration,
    /// Cadence of the live preview stream.
    pub preview_interval: Duration,
    pub gate: GatePolicy,
}

impl Config {
    /// Load configuration from `EFL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let cooldown = Duration::from_secs(parse_or(&var, "EFL_COOLDOWN_SECS", 15));
        let quiet_window = Duration::from_secs(parse_or(&var, "EFL_QUIET_WINDOW_SECS", 5));
        let suppress = var("EFL_SUPPRESS_RAPID_WARNINGS")
            .map(|v| v != "0")
            .unwrap_or(true);

        Self {
            listen_addr: var("EFL_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            db_path: var("EFL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(efl_store::default_db_path),
            encoder_url: var("EFL_ENCODER_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8090".to_string()),
            encoder_timeout: Duration::from_secs(parse_or(&var, "EFL_ENCODER_TIMEOUT_SECS", 10)),
            match_threshold: parse_or(&var, "EFL_MATCH_THRESHOLD", 0.40),
            frame_interval: Duration::from_millis(parse_or(&var, "EFL_FRAME_INTERVAL_MS", 100)),
            preview_interval: Duration::from_millis(parse_or(&var, "EFL_PREVIEW_INTERVAL_MS", 500)),
            gate: GatePolicy {
                cooldown,
                quiet_window: suppress.then_some(quiet_window),
            },
        }
    }
}

fn parse_or<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
