use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Queue-wide configuration, persisted as `config.json` under the data
/// directory. Missing file means defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Default retry budget for jobs enqueued without one.
    pub max_retries: u32,
    /// Base of the exponential backoff between failed attempts.
    pub backoff_base: f64,
    /// Upper bound on a single backoff delay, in seconds.
    pub backoff_max_delay: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            backoff_max_delay: 3600,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backoff_base <= 1.0 {
            return Err(QueueError::Validation(format!(
                "backoff-base must be greater than 1.0, got {}",
                self.backoff_base
            )));
        }
        if self.backoff_max_delay == 0 {
            return Err(QueueError::Validation(
                "backoff-max-delay must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a `config set <key> <value>` update. The record is only
    /// mutated if the resulting configuration validates.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "max-retries" => {
                updated.max_retries = value.parse().map_err(|_| {
                    QueueError::Validation(format!("Invalid max-retries value: {value}"))
                })?;
            }
            "backoff-base" => {
                updated.backoff_base = value.parse().map_err(|_| {
                    QueueError::Validation(format!("Invalid backoff-base value: {value}"))
                })?;
            }
            "backoff-max-delay" => {
                updated.backoff_max_delay = value.parse().map_err(|_| {
                    QueueError::Validation(format!("Invalid backoff-max-delay value: {value}"))
                })?;
            }
            _ => {
                return Err(QueueError::Validation(format!("Unknown config key: {key}")));
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, 2.0);
        assert_eq!(config.backoff_max_delay, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_set_known_keys() {
        let mut config = QueueConfig::default();
        config.set("max-retries", "5").unwrap();
        config.set("backoff-base", "3.5").unwrap();
        config.set("backoff-max-delay", "120").unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, 3.5);
        assert_eq!(config.backoff_max_delay, 120);
    }

    #[test]
    fn test_set_unknown_key() {
        let mut config = QueueConfig::default();
        let err = config.set("poll-interval", "2").unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[test]
    fn test_set_unparseable_value() {
        let mut config = QueueConfig::default();
        assert!(config.set("max-retries", "many").is_err());
        assert!(config.set("max-retries", "-1").is_err());
        assert!(config.set("backoff-base", "fast").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = QueueConfig::default();
        assert!(config.set("backoff-base", "1.0").is_err());
        assert!(config.set("backoff-max-delay", "0").is_err());
        // Failed sets still leave a validating record behind.
        assert!(config.validate().is_ok());
    }
}
