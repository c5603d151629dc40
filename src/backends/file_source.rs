//! Target source backed by a polled JSON file.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use targetsync_core::{Error, Result, ResultExt, SnapshotStream, Target, TargetSource};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::parse_targets;

/// Polls a JSON array of targets and emits a snapshot whenever it changes.
///
/// The first snapshot is read during [`subscribe`](TargetSource::subscribe)
/// and a failure there fails the subscription. Later read or parse errors
/// are logged and the previous snapshot stands.
pub struct FileSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileSource {
    pub fn new(path: PathBuf, poll_interval: Duration) -> Self {
        Self {
            path,
            poll_interval,
        }
    }
}

#[async_trait]
impl TargetSource for FileSource {
    async fn subscribe(&self, scope: CancellationToken) -> Result<SnapshotStream> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::file_read_failed(&self.path, e))?;
        let initial = parse_targets(&self.path, &content)?;

        let (tx, rx) = mpsc::channel(1);
        let poller = Poller {
            path: self.path.clone(),
            poll_interval: self.poll_interval,
            last_content: content,
            last_snapshot: initial.clone(),
            tx,
        };
        tokio::spawn(poller.run(initial, scope));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

struct Poller {
    path: PathBuf,
    poll_interval: Duration,
    last_content: String,
    last_snapshot: Vec<Target>,
    tx: mpsc::Sender<Vec<Target>>,
}

impl Poller {
    async fn run(mut self, initial: Vec<Target>, scope: CancellationToken) {
        if !self.emit(initial, &scope).await {
            return;
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = scope.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if let Some(snapshot) = self.poll().await {
                if !self.emit(snapshot, &scope).await {
                    return;
                }
            }
        }
    }

    /// Read the file; `Some` only when it holds a new, valid target set.
    async fn poll(&mut self) -> Option<Vec<Target>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read targets file");
                return None;
            }
        };
        if content == self.last_content {
            return None;
        }
        self.last_content = content;

        let snapshot = parse_targets(&self.path, &self.last_content)
            .into_option_logged("Ignoring unparsable targets file")?;
        if snapshot == self.last_snapshot {
            return None;
        }
        self.last_snapshot.clone_from(&snapshot);
        Some(snapshot)
    }

    /// Send a snapshot; `false` once nobody is listening or `scope` is cancelled.
    async fn emit(&self, snapshot: Vec<Target>, scope: &CancellationToken) -> bool {
        debug!(count = snapshot.len(), "Publishing targets snapshot");
        tokio::select! {
            biased;
            () = scope.cancelled() => false,
            sent = self.tx.send(snapshot) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use futures::StreamExt;
    use tempfile::TempDir;
    use tokio::time::timeout;

    use super::*;

    const POLL: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_secs(5);

    fn write(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("targets.json");
        std::fs::write(&path, content).expect("Failed to write targets file");
        path
    }

    #[tokio::test]
    async fn test_missing_file_fails_subscription() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::new(dir.path().join("absent.json"), POLL);

        let result = source.subscribe(CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }

    #[tokio::test]
    async fn test_emits_initial_snapshot_then_changes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, r#"[{"ip": "10.0.0.1"}]"#);
        let scope = CancellationToken::new();
        let mut snapshots = FileSource::new(path, POLL).subscribe(scope.clone()).await.unwrap();

        let first = timeout(WAIT, snapshots.next()).await.unwrap().unwrap();
        assert_eq!(first, vec![Target::new("10.0.0.1")]);

        write(&dir, r#"[{"ip": "10.0.0.1"}, {"ip": "10.0.0.2", "port": 8080}]"#);
        let second = timeout(WAIT, snapshots.next()).await.unwrap().unwrap();
        assert_eq!(
            second,
            vec![Target::new("10.0.0.1"), Target::new("10.0.0.2").with_port(8080)]
        );

        scope.cancel();
        assert!(timeout(WAIT, snapshots.next()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unparsable_update_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, r#"[{"ip": "10.0.0.1"}]"#);
        let scope = CancellationToken::new();
        let mut snapshots = FileSource::new(path, POLL).subscribe(scope.clone()).await.unwrap();
        timeout(WAIT, snapshots.next()).await.unwrap().unwrap();

        write(&dir, "[{");
        tokio::time::sleep(POLL * 5).await;
        write(&dir, "[]");

        let next = timeout(WAIT, snapshots.next()).await.unwrap().unwrap();
        assert!(next.is_empty());

        scope.cancel();
    }
}
