//! Run configuration resolved from CLI, environment and TOML

use std::time::Duration;

use catmig_common::config::TomlConfig;
use tracing::{info, warn};

use crate::error::{ReconError, ReconResult};

/// Environment variable holding the authority API key
pub const API_KEY_ENV_VAR: &str = "CATMIG_API_KEY";

/// Resolve the authority API key
///
/// **Priority:** CLI → ENV → TOML
pub fn resolve_api_key(cli_key: Option<&str>, toml_config: &TomlConfig) -> ReconResult<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR).ok();
    let candidates = [
        ("command line", cli_key.map(str::to_string)),
        ("environment", env_key),
        ("TOML", toml_config.authority.api_key.clone()),
    ];

    let valid: Vec<_> = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)))
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if valid.len() > 1 {
        let sources: Vec<_> = valid.iter().map(|(source, _)| *source).collect();
        warn!(
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match valid.into_iter().next() {
        Some((source, key)) => {
            info!("API key loaded from {}", source);
            Ok(key.trim().to_string())
        }
        None => Err(ReconError::Config(format!(
            "authority API key not configured. Use one of:\n\
             1. Command line: --api-key <key>\n\
             2. Environment: {API_KEY_ENV_VAR}=<key>\n\
             3. TOML config: [authority] api_key = \"<key>\"\n\
             or run against the cache with --cache"
        ))),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Inter-attempt delays from `[authority] backoff_ms`
pub fn backoff(toml_config: &TomlConfig) -> Vec<Duration> {
    toml_config
        .authority
        .backoff_ms
        .iter()
        .map(|ms| Duration::from_millis(*ms))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_toml_key(key: Option<&str>) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.authority.api_key = key.map(str::to_string);
        config
    }

    #[test]
    #[serial]
    fn test_cli_key_wins() {
        std::env::set_var(API_KEY_ENV_VAR, "from-env");
        let key = resolve_api_key(Some("from-cli"), &with_toml_key(Some("from-toml"))).unwrap();
        assert_eq!(key, "from-cli");
        std::env::remove_var(API_KEY_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_env_beats_toml() {
        std::env::set_var(API_KEY_ENV_VAR, "from-env");
        let key = resolve_api_key(None, &with_toml_key(Some("from-toml"))).unwrap();
        assert_eq!(key, "from-env");
        std::env::remove_var(API_KEY_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_blank_keys_ignored() {
        std::env::remove_var(API_KEY_ENV_VAR);
        let key = resolve_api_key(Some("  "), &with_toml_key(Some("from-toml"))).unwrap();
        assert_eq!(key, "from-toml");
        assert!(matches!(
            resolve_api_key(None, &with_toml_key(None)),
            Err(ReconError::Config(_))
        ));
    }

    #[test]
    fn test_backoff_from_config() {
        let config = TomlConfig::default();
        assert_eq!(
            backoff(&config),
            vec![Duration::from_millis(500), Duration::from_millis(300)]
        );
    }
}
