//! Small environment-variable parsing helpers shared by `AppConfig::from_env`.
//! Kept as free functions rather than a stateful loader — unlike the
//! teacher's `ConfigLoader`, nothing here needs to watch the filesystem or
//! hot-reload, since `spec.md` §6 configuration is read once at process
//! start.

use crate::error::ConfigError;

pub fn env_string(key: &'static str, default: Option<&str>) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => default.map(|d| d.to_string()),
    }
}

pub fn env_var_parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

pub fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key)),
        },
        Err(_) => Ok(default),
    }
}

/// Comma-separated list, trimming whitespace around each entry and
/// dropping empty entries (a trailing comma or an unset variable both
/// yield an empty `Vec` rather than a list containing `""`).
pub fn env_url_list(key: &'static str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_common_spellings() {
        std::env::set_var("CONFIG_TEST_BOOL", "yes");
        assert_eq!(env_bool("CONFIG_TEST_BOOL", false).unwrap(), true);
        std::env::set_var("CONFIG_TEST_BOOL", "0");
        assert_eq!(env_bool("CONFIG_TEST_BOOL", true).unwrap(), false);
        std::env::remove_var("CONFIG_TEST_BOOL");
    }

    #[test]
    fn env_bool_rejects_garbage() {
        std::env::set_var("CONFIG_TEST_BOOL_BAD", "maybe");
        assert!(env_bool("CONFIG_TEST_BOOL_BAD", true).is_err());
        std::env::remove_var("CONFIG_TEST_BOOL_BAD");
    }

    #[test]
    fn url_list_drops_empty_entries_and_trims_whitespace() {
        std::env::set_var("CONFIG_TEST_URLS", " a:1 ,, b:2,");
        assert_eq!(env_url_list("CONFIG_TEST_URLS"), vec!["a:1", "b:2"]);
        std::env::remove_var("CONFIG_TEST_URLS");
    }

    #[test]
    fn unset_url_list_is_empty() {
        std::env::remove_var("CONFIG_TEST_URLS_UNSET");
        assert!(env_url_list("CONFIG_TEST_URLS_UNSET").is_empty());
    }
}
