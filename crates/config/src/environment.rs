//! Deployment environment, read from `APP_ENVIRONMENT`. Gates the handful
//! of defaults that legitimately differ between a developer's laptop and a
//! real deployment (poll interval, log format) the way
//! `config::environment::Environment` gates them in the teacher.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub fn from_str(s: &str) -> Result<Self, super::ConfigError> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "test" | "testing" => Ok(Environment::Test),
            other => Err(super::ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Environment::Test)
    }

    /// Test mode gets the fast 2s executor poll interval from `spec.md`
    /// §4.6; every other environment gets the 10s production default.
    pub fn default_poll_interval_seconds(&self) -> u64 {
        if self.is_test() {
            2
        } else {
            10
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_aliases() {
        assert_eq!(Environment::from_str("prod").unwrap(), Environment::Production);
        assert_eq!(Environment::from_str("DEV").unwrap(), Environment::Development);
        assert_eq!(Environment::from_str("testing").unwrap(), Environment::Test);
    }

    #[test]
    fn rejects_unknown_environment_names() {
        assert!(Environment::from_str("qa").is_err());
    }

    #[test]
    fn test_environment_uses_the_fast_poll_interval() {
        assert_eq!(Environment::Test.default_poll_interval_seconds(), 2);
        assert_eq!(Environment::Production.default_poll_interval_seconds(), 10);
    }
}
