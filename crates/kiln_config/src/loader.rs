//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KilnConfig;
use std::path::Path;

/// Name of the configuration file within a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a project directory.
///
/// A missing file is not an error: the defaults apply.
pub fn load_config(project_dir: &Path) -> Result<KilnConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(KilnConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are within their supported ranges.
fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    config.forward.validate()?;
    if config.log.filter.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "log.filter must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, KilnConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[rules]
lint = false

[forward]
hash_digits = 8

[log]
filter = "kiln_rules=debug,info"
with_target = true
"#;
        let config = load_config_from_str(toml).unwrap();
        assert!(!config.rules.lint);
        assert_eq!(config.forward.hash_digits, 8);
        assert_eq!(config.log.filter, "kiln_rules=debug,info");
        assert!(config.log.with_target);
    }

    #[test]
    fn zero_hash_digits_errors() {
        let err = load_config_from_str("[forward]\nhash_digits = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn oversized_hash_digits_errors() {
        let err = load_config_from_str("[forward]\nhash_digits = 33\n").unwrap_err();
        assert!(err.to_string().contains("hash_digits"));
    }

    #[test]
    fn empty_filter_errors() {
        let err = load_config_from_str("[log]\nfilter = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn unknown_value_type_errors() {
        let err = load_config_from_str("[rules]\nlint = \"yes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config, KilnConfig::default());
    }

    #[test]
    fn load_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[forward]\nhash_digits = 4\n").unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.forward.hash_digits, 4);
    }

    #[test]
    fn io_error_from_directory_named_like_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(CONFIG_FILE)).unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
