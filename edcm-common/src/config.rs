//! Configuration file loading
//!
//! The TOML file is the lowest-priority explicit source. Resolution order for
//! the file itself:
//! 1. Path given on the command line
//! 2. `EDCM_CONFIG` environment variable
//! 3. `~/.config/edcm/config.toml` (platform config dir)
//!
//! A missing default file is not an error: the caller gets
//! [`TomlConfig::default()`] and a warning is logged. A file that exists but
//! does not parse is always a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "EDCM_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Target EDC connection settings
    #[serde(default)]
    pub target: TargetSection,

    /// Synchronization engine tuning
    #[serde(default)]
    pub engine: EngineSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory receiving the failure logs
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// `[target]` table. Every key is optional here; completeness is checked
/// by the migration crate so an incomplete config can skip the run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TargetSection {
    pub host: Option<String>,
    pub api_version: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `[engine]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineSection {
    /// Maximum form-discovery polls per event
    pub max_polls: Option<u32>,
    /// Initial delay between discovery polls
    pub poll_backoff_ms: Option<u64>,
    /// Ceiling for the doubling poll delay
    pub poll_backoff_max_ms: Option<u64>,
    /// Per-request HTTP timeout
    pub request_timeout_secs: Option<u64>,
    /// Minimum spacing between requests (0 disables throttling)
    pub min_request_interval_ms: Option<u64>,
    /// Create repeating item groups before their first item post
    pub precreate_repeating_item_groups: Option<bool>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform default config file path (`<config_dir>/edcm/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("edcm").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve and load the config file
///
/// An explicit path (argument or environment variable) must exist. The
/// platform default may be absent.
pub fn resolve_toml_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = cli_path {
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            info!("Loading config from {} ({})", path, CONFIG_ENV_VAR);
            return load_toml_config(Path::new(&path));
        }
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        Some(path) => {
            debug!("No config file at {}", path.display());
            warn!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert!(config.target.host.is_none());
        assert!(config.engine.max_polls.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_partial_target_section() {
        let config: TomlConfig = toml::from_str(
            r#"
            [target]
            host = "example.veevavault.com"
            username = "migrator@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.target.host.as_deref(), Some("example.veevavault.com"));
        assert!(config.target.password.is_none());
        assert!(config.target.api_version.is_none());
    }

    #[test]
    fn test_default_config_path_ends_with_edcm() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("edcm/config.toml"));
        }
    }
}
