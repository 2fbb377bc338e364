//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;

use crate::error::ConfigError;

/// Default number of hex digits in a derived command-key hash suffix.
pub const DEFAULT_HASH_DIGITS: usize = 16;

/// Largest hash suffix a 128-bit content hash can provide.
pub const MAX_HASH_DIGITS: usize = 32;

/// The top-level engine configuration parsed from `kiln.toml`.
///
/// Every section is optional; an empty file yields [`KilnConfig::default`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct KilnConfig {
    /// Rule compiler settings.
    #[serde(default)]
    pub rules: RulesConfig,
    /// Forward cache settings.
    #[serde(default)]
    pub forward: ForwardConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Settings consumed by the rule compiler.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RulesConfig {
    /// Whether compiled rules expose the builtin handlers' lint hooks.
    #[serde(default = "default_true")]
    pub lint: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self { lint: true }
    }
}

/// Settings consumed by the forward cache.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ForwardConfig {
    /// Hex digits of the hash suffix appended to command-derived keys.
    #[serde(default = "default_hash_digits")]
    pub hash_digits: usize,
}

impl ForwardConfig {
    /// Checks that `hash_digits` is within `1..=MAX_HASH_DIGITS`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let digits = self.hash_digits;
        if !(1..=MAX_HASH_DIGITS).contains(&digits) {
            return Err(ConfigError::ValidationError(format!(
                "forward.hash_digits must be between 1 and {MAX_HASH_DIGITS}, got {digits}"
            )));
        }
        Ok(())
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            hash_digits: DEFAULT_HASH_DIGITS,
        }
    }
}

/// Logging settings applied by [`logging::init`](crate::logging::init).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// An `EnvFilter` directive string, e.g. `"kiln_rules=debug,info"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Whether to print the event target (module path) with each line.
    #[serde(default)]
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            with_target: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_hash_digits() -> usize {
    DEFAULT_HASH_DIGITS
}

fn default_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = KilnConfig::default();
        assert!(config.rules.lint);
        assert_eq!(config.forward.hash_digits, DEFAULT_HASH_DIGITS);
        assert_eq!(config.log.filter, "info");
        assert!(!config.log.with_target);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config: KilnConfig = toml::from_str("[log]\nwith_target = true\n").unwrap();
        assert!(config.log.with_target);
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.rules, RulesConfig::default());
    }

    #[test]
    fn forward_digits_are_range_checked() {
        assert!(ForwardConfig::default().validate().is_ok());
        assert!(ForwardConfig { hash_digits: MAX_HASH_DIGITS }.validate().is_ok());
        for hash_digits in [0, MAX_HASH_DIGITS + 1] {
            let err = ForwardConfig { hash_digits }.validate().unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)));
        }
    }
}
