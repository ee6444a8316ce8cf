use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::ConfigError;

const NAME_VAR: &str = "STATE_OBSERVER_NAME";
const POLL_INTERVAL_VAR: &str = "STATE_OBSERVER_POLL_INTERVAL_MS";

/// Configuration for a state observer.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Label attached to every log line the loop emits
    pub name: String,
    /// How often the remote state is polled
    pub poll_interval: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            name: "observer".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ObserverConfig {
    /// Create a default config with a specific name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();

        let poll_interval = match env::var(POLL_INTERVAL_VAR) {
            Ok(raw) => parse_interval(&raw)?,
            Err(_) => defaults.poll_interval,
        };

        Ok(Self {
            name: env::var(NAME_VAR).unwrap_or(defaults.name),
            poll_interval,
        })
    }
}

fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = raw
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidInterval {
            var: POLL_INTERVAL_VAR,
            source,
        })?;
    if millis == 0 {
        return Err(ConfigError::ZeroInterval {
            var: POLL_INTERVAL_VAR,
        });
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.name, "observer");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_config_builders() {
        let config =
            ObserverConfig::with_name("boiler").with_poll_interval(Duration::from_millis(250));
        assert_eq!(config.name, "boiler");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval(" 150 ").ok(), Some(Duration::from_millis(150)));
        assert!(matches!(
            parse_interval("fast"),
            Err(ConfigError::InvalidInterval { .. })
        ));
        assert!(matches!(
            parse_interval("0"),
            Err(ConfigError::ZeroInterval { .. })
        ));
    }
}
