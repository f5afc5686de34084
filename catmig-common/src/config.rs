//! Bootstrap configuration loading
//!
//! Config file resolution priority:
//! 1. Command-line `--config` argument (highest priority)
//! 2. `CATMIG_CONFIG` environment variable
//! 3. `<config_dir>/catmig/config.toml`
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CATMIG_CONFIG";

/// Default authority endpoint; the identifier is appended as a path segment
pub const DEFAULT_AUTHORITY_URL: &str = "http://www.worldcat.org/webservices/catalog/content";

/// Tags replaced from the authority record unless configured otherwise
pub const DEFAULT_SUBSTITUTION_TAGS: &[&str] = &[
    "006", "007", "008", "024", "028", "041", "043", "082", "084", "100", "110", "111", "130",
    "222", "240", "245", "246", "247", "250", "264", "300", "337", "340", "362", "386", "490",
    "505", "510", "511", "520", "521", "526", "533", "538", "541", "550", "600", "610", "611",
    "630", "650", "651", "655", "700", "710", "730", "740", "752", "760", "765", "780", "830",
    "850",
];

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Directory receiving record outputs, audit logs and saved MARCXML
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// SQLite file holding cached authority records
    #[serde(default)]
    pub cache_database: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub authority: AuthorityConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Authority API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    #[serde(default = "default_authority_url")]
    pub base_url: String,

    /// Credential token sent with every lookup
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delays between lookup attempts; its length plus one is the attempt budget
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: default_authority_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Substitution settings, fixed for the whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// `replace_and_add` or `replace_only`
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Minimum token-sort title ratio (0-100) for a fuzzy pass
    #[serde(default = "default_min_ratio")]
    pub min_ratio: u8,

    #[serde(default = "default_tags")]
    pub tags: Vec<String>,

    /// Institution policy name (`none`, `art-school`)
    #[serde(default = "default_policy")]
    pub policy: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            min_ratio: default_min_ratio(),
            tags: default_tags(),
            policy: default_policy(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_authority_url() -> String {
    DEFAULT_AUTHORITY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backoff_ms() -> Vec<u64> {
    vec![500, 300]
}

fn default_strategy() -> String {
    "replace_and_add".to_string()
}

fn default_min_ratio() -> u8 {
    50
}

fn default_tags() -> Vec<String> {
    DEFAULT_SUBSTITUTION_TAGS.iter().map(|t| t.to_string()).collect()
}

fn default_policy() -> String {
    "none".to_string()
}

impl TomlConfig {
    /// Output directory, falling back to `./output`
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("output"))
    }

    /// Cache database path, falling back to the OS data directory
    pub fn cache_database(&self) -> PathBuf {
        self.cache_database
            .clone()
            .unwrap_or_else(default_cache_database)
    }
}

/// Locate the config file to load, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: user config directory
    let user_config = dirs::config_dir().map(|d| d.join("catmig").join("config.toml"))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        debug!("No config file at {}", user_config.display());
        None
    }
}

/// Load the bootstrap config, or defaults when no file is given
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    if config.reconcile.min_ratio > 100 {
        return Err(Error::Config(format!(
            "min_ratio must be between 0 and 100, got {}",
            config.reconcile.min_ratio
        )));
    }

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// OS-dependent default location of the authority cache
fn default_cache_database() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("catmig").join("authority-cache.db"))
        .unwrap_or_else(|| PathBuf::from("./catmig_data/authority-cache.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.reconcile.strategy, "replace_and_add");
        assert_eq!(config.reconcile.min_ratio, 50);
        assert_eq!(config.reconcile.tags.len(), DEFAULT_SUBSTITUTION_TAGS.len());
        assert_eq!(config.authority.backoff_ms, vec![500, 300]);
        assert_eq!(config.output_dir(), PathBuf::from("output"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
output_dir = "/tmp/catmig-out"

[authority]
api_key = "secret"

[reconcile]
strategy = "replace_only"
tags = ["245", "500"]
"#
        )
        .unwrap();

        let config = load_toml_config(Some(file.path())).unwrap();
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/catmig-out"));
        assert_eq!(config.authority.api_key.as_deref(), Some("secret"));
        assert_eq!(config.authority.base_url, DEFAULT_AUTHORITY_URL);
        assert_eq!(config.reconcile.strategy, "replace_only");
        assert_eq!(config.reconcile.tags, vec!["245", "500"]);
        assert_eq!(config.reconcile.min_ratio, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_out_of_range_ratio_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reconcile]\nmin_ratio = 150").unwrap();
        assert!(matches!(
            load_toml_config(Some(file.path())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir = [").unwrap();
        assert!(matches!(
            load_toml_config(Some(file.path())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_cli_path_beats_environment() {
        std::env::set_var(CONFIG_ENV_VAR, "/from/env.toml");
        let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")));
        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));

        let resolved = resolve_config_path(None);
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var(CONFIG_ENV_VAR);
    }
}
