//! Sync configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Options forwarded untouched to the [`Locker`](crate::Locker) backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Name of the lock shared by every instance syncing the same destination.
    #[serde(default = "default_lock_key")]
    pub key: String,

    /// How long a held lock survives without being refreshed.
    #[serde(default = "default_lock_ttl", rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            key: default_lock_key(),
            ttl: default_lock_ttl(),
        }
    }
}

/// Configuration for one syncer. Loaded once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lock options for leader election.
    #[serde(default)]
    pub lock: LockOptions,

    /// How long a target must stay absent from the source before it is
    /// removed from the destination.
    #[serde(
        default = "default_remove_delay",
        rename = "remove_delay_secs",
        with = "duration_secs"
    )]
    pub remove_delay: Duration,

    /// Cadence at which a failed removal is attempted again.
    #[serde(
        default = "default_retry_interval",
        rename = "retry_interval_ms",
        with = "duration_ms"
    )]
    pub retry_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock: LockOptions::default(),
            remove_delay: default_remove_delay(),
            retry_interval: default_retry_interval(),
        }
    }
}

impl SyncConfig {
    /// Create a config with the given removal delay and default lock options.
    #[must_use]
    pub fn with_remove_delay(remove_delay: Duration) -> Self {
        Self {
            remove_delay,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the lock key is empty or the
    /// retry interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.lock.key.trim().is_empty() {
            return Err(Error::invalid_config("lock key must not be empty"));
        }
        if self.retry_interval.is_zero() {
            return Err(Error::invalid_config("retry_interval_ms must be greater than 0"));
        }
        Ok(())
    }
}

fn default_lock_key() -> String {
    "targetsync".to_string()
}

const fn default_lock_ttl() -> Duration {
    Duration::from_secs(15)
}

const fn default_remove_delay() -> Duration {
    Duration::from_secs(30)
}

const fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

/// Serde adapter for durations written as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialize a duration from seconds.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Serde adapter for durations written as milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as milliseconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize a duration from milliseconds.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_lock_key_rejected() {
        let config = SyncConfig {
            lock: LockOptions {
                key: "  ".to_string(),
                ..LockOptions::default()
            },
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_retry_interval_rejected() {
        let config = SyncConfig {
            retry_interval: Duration::ZERO,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_remove_delay_allowed() {
        assert!(SyncConfig::with_remove_delay(Duration::ZERO).validate().is_ok());
    }

    #[test]
    fn test_deserialize_units() {
        let json = r#"{"remove_delay_secs": 5, "retry_interval_ms": 250, "lock": {"key": "tg-web", "ttl_secs": 10}}"#;
        let config: std::result::Result<SyncConfig, _> = serde_json::from_str(json);
        let config = config.ok();
        assert_eq!(config.as_ref().map(|c| c.remove_delay), Some(Duration::from_secs(5)));
        assert_eq!(
            config.as_ref().map(|c| c.retry_interval),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.map(|c| c.lock.key), Some("tg-web".to_string()));
    }
}
