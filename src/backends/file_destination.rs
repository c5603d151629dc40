//! JSON file standing in for a load-balancer target group.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use targetsync_core::{Error, Result, Target, TargetDestination, TargetKey};
use tokio::sync::Mutex;
use tracing::debug;

use super::read_targets;

/// Target group persisted as a JSON array.
///
/// A missing file is an empty group. Writes replace the file atomically
/// through a temp file and a rename, so readers never see a partial group.
pub struct FileDestination {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileDestination {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<TargetKey, Target>> {
        let targets = read_targets(&self.path).await?.unwrap_or_default();
        Ok(targets.into_iter().map(|t| (t.key(), t)).collect())
    }

    async fn store(&self, group: BTreeMap<TargetKey, Target>) -> Result<()> {
        let targets: Vec<Target> = group.into_values().collect();
        let json = serde_json::to_vec_pretty(&targets)
            .map_err(|e| Error::backend("file-destination", e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = targets.len(), "Wrote target group");
        Ok(())
    }

    async fn update(&self, apply: impl FnOnce(&mut BTreeMap<TargetKey, Target>)) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut group = self.load().await?;
        apply(&mut group);
        self.store(group).await
    }
}

#[async_trait]
impl TargetDestination for FileDestination {
    async fn get_targets(&self) -> Result<Vec<Target>> {
        Ok(self.load().await?.into_values().collect())
    }

    async fn add_targets(&self, targets: &[Target]) -> Result<()> {
        self.update(|group| {
            for target in targets {
                group.insert(target.key(), target.clone());
            }
        })
        .await
    }

    async fn remove_targets(&self, targets: &[Target]) -> Result<()> {
        self.update(|group| {
            for target in targets {
                group.remove(&target.key());
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, FileDestination) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let destination = FileDestination::new(dir.path().join("group.json"));
        (dir, destination)
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_group() {
        let (_dir, destination) = setup();

        assert!(destination.get_targets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_then_remove() {
        let (_dir, destination) = setup();

        destination
            .add_targets(&[Target::new("10.0.0.1"), Target::new("10.0.0.2").with_port(8080)])
            .await
            .unwrap();
        destination.remove_targets(&[Target::new("10.0.0.1")]).await.unwrap();

        let targets = destination.get_targets().await.unwrap();
        assert_eq!(targets, vec![Target::new("10.0.0.2").with_port(8080)]);
    }

    #[tokio::test]
    async fn test_add_is_keyed_by_ip() {
        let (_dir, destination) = setup();

        destination.add_targets(&[Target::new("10.0.0.1").with_port(80)]).await.unwrap();
        destination.add_targets(&[Target::new("10.0.0.1").with_port(81)]).await.unwrap();

        let targets = destination.get_targets().await.unwrap();
        assert_eq!(targets, vec![Target::new("10.0.0.1").with_port(81)]);
    }

    #[tokio::test]
    async fn test_remove_unknown_target_is_noop() {
        let (_dir, destination) = setup();
        destination.add_targets(&[Target::new("10.0.0.1")]).await.unwrap();

        destination.remove_targets(&[Target::new("10.0.0.9")]).await.unwrap();

        assert_eq!(destination.get_targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_read_error() {
        let (dir, destination) = setup();
        std::fs::write(dir.path().join("group.json"), "not json").unwrap();

        assert!(destination.get_targets().await.is_err());
        assert!(destination.add_targets(&[Target::new("10.0.0.1")]).await.is_err());
    }
}
