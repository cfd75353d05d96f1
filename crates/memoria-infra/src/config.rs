//! Global configuration loader for Memoria.
//!
//! Reads `config.toml` from the data directory (`~/.memoria/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use memoria_types::config::GlobalConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "MEMORIA_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory.
///
/// `MEMORIA_DATA_DIR` wins; otherwise `~/.memoria`, or `.memoria` relative to
/// the working directory when no home directory is known.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".memoria"))
        .unwrap_or_else(|| PathBuf::from(".memoria"))
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unreadable config file, using defaults");
            return GlobalConfig::default();
        }
    };

    toml::from_str::<GlobalConfig>(&content).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), error = %err, "malformed config file, using defaults");
        GlobalConfig::default()
    })
}
