//! Settings file loading.
//!
//! One file describes the sync parameters and which backend to use for the
//! lock, the source and the destination. `.toml` files are parsed as TOML,
//! anything else as YAML.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use targetsync_core::config::duration_ms;
use targetsync_core::{Error, Result, SyncConfig};

/// Everything the daemon reads at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Sync parameters handed to the core.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Leader-election backend.
    #[serde(default)]
    pub locker: LockerSettings,

    /// Where targets come from.
    pub source: SourceSettings,

    /// Where targets are mirrored to.
    pub destination: DestinationSettings,
}

/// Leader-election backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LockerSettings {
    /// Single instance; always the leader.
    #[default]
    Local,

    /// Lock files in a directory shared by every instance.
    File {
        /// Directory holding `<lock key>.lock`.
        path: PathBuf,
        /// How often the lock is contended for or refreshed.
        #[serde(
            default = "default_poll_interval",
            rename = "poll_interval_ms",
            with = "duration_ms"
        )]
        poll_interval: Duration,
    },
}

/// Target source selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSettings {
    /// JSON array of targets, polled for changes.
    File {
        path: PathBuf,
        #[serde(
            default = "default_poll_interval",
            rename = "poll_interval_ms",
            with = "duration_ms"
        )]
        poll_interval: Duration,
    },
}

/// Target destination selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DestinationSettings {
    /// JSON array of targets, rewritten on every change.
    File { path: PathBuf },
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl Settings {
    /// Read, parse and validate a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileReadFailed`] if the file cannot be read,
    /// [`Error::ConfigParseFailed`] if it is not valid TOML/YAML for this
    /// shape, or [`Error::InvalidConfig`] if validation fails.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::file_read_failed(path, e))?;
        let settings = Self::parse(path, &content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings text, picking the format from `path`'s extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParseFailed`] if the text does not parse.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(content).map_err(|e| Error::config_parse_failed(path, e))
        } else {
            serde_yaml::from_str(content).map_err(|e| Error::config_parse_failed(path, e))
        }
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the sync config is invalid, a poll
    /// interval is zero, or the file lock would expire between refreshes.
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        if let LockerSettings::File { poll_interval, .. } = &self.locker {
            if poll_interval.is_zero() {
                return Err(Error::invalid_config("locker poll_interval_ms must be greater than 0"));
            }
            if *poll_interval >= self.sync.lock.ttl {
                return Err(Error::invalid_config(
                    "locker poll_interval_ms must be shorter than the lock ttl",
                ));
            }
        }

        let SourceSettings::File { poll_interval, .. } = &self.source;
        if poll_interval.is_zero() {
            return Err(Error::invalid_config("source poll_interval_ms must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const TOML: &str = r#"
[sync]
remove_delay_secs = 60
retry_interval_ms = 500

[sync.lock]
key = "tg-web"
ttl_secs = 20

[locker]
type = "file"
path = "/var/run/targetsync"
poll_interval_ms = 2000

[source]
type = "file"
path = "/etc/targetsync/source.json"

[destination]
type = "file"
path = "/var/lib/targetsync/group.json"
"#;

    const YAML: &str = r"
source:
  type: file
  path: source.json
  poll_interval_ms: 250
destination:
  type: file
  path: group.json
";

    #[test]
    fn test_parse_toml() {
        let settings = Settings::parse(Path::new("sync.toml"), TOML).unwrap();

        assert_eq!(settings.sync.remove_delay, Duration::from_secs(60));
        assert_eq!(settings.sync.retry_interval, Duration::from_millis(500));
        assert_eq!(settings.sync.lock.key, "tg-web");
        assert_eq!(settings.sync.lock.ttl, Duration::from_secs(20));
        assert_eq!(
            settings.locker,
            LockerSettings::File {
                path: PathBuf::from("/var/run/targetsync"),
                poll_interval: Duration::from_secs(2),
            }
        );
        assert_eq!(
            settings.source,
            SourceSettings::File {
                path: PathBuf::from("/etc/targetsync/source.json"),
                poll_interval: Duration::from_secs(1),
            }
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_uses_defaults() {
        let settings = Settings::parse(Path::new("sync.yaml"), YAML).unwrap();

        assert_eq!(settings.sync, SyncConfig::default());
        assert_eq!(settings.locker, LockerSettings::Local);
        assert_eq!(
            settings.source,
            SourceSettings::File {
                path: PathBuf::from("source.json"),
                poll_interval: Duration::from_millis(250),
            }
        );
        assert_eq!(
            settings.destination,
            DestinationSettings::File {
                path: PathBuf::from("group.json")
            }
        );
    }

    #[test]
    fn test_unknown_extension_parsed_as_yaml() {
        assert!(Settings::parse(Path::new("sync.conf"), YAML).is_ok());
        assert!(matches!(
            Settings::parse(Path::new("sync.conf"), TOML),
            Err(Error::ConfigParseFailed { .. })
        ));
    }

    #[test]
    fn test_missing_source_rejected() {
        let result = Settings::parse(
            Path::new("sync.toml"),
            "[destination]\ntype = \"file\"\npath = \"group.json\"\n",
        );
        assert!(matches!(result, Err(Error::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_lock_poll_must_be_shorter_than_ttl() {
        let mut settings = Settings::parse(Path::new("sync.toml"), TOML).unwrap();
        settings.locker = LockerSettings::File {
            path: PathBuf::from("/tmp"),
            poll_interval: Duration::from_secs(20),
        };

        assert!(matches!(settings.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_source_poll_rejected() {
        let mut settings = Settings::parse(Path::new("sync.yaml"), YAML).unwrap();
        settings.source = SourceSettings::File {
            path: PathBuf::from("source.json"),
            poll_interval: Duration::ZERO,
        };

        assert!(settings.validate().is_err());
    }
}
