//! Leader-election backends.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use targetsync_core::{ElectionStream, LockOptions, Locker, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Single-instance locker: elected at once and never deposed.
pub struct LocalLocker;

#[async_trait]
impl Locker for LocalLocker {
    async fn lock(&self, _scope: CancellationToken, options: &LockOptions) -> Result<ElectionStream> {
        debug!(key = %options.key, "Local lock granted");
        Ok(Box::pin(stream::once(async { true }).chain(stream::pending())))
    }
}

/// Lock file on a filesystem shared by every contender.
///
/// The holder owns `<dir>/<key>.lock`, which holds its owner id, and
/// rewrites it every poll interval. A lock file not rewritten within the
/// lock TTL is stale and may be taken over.
pub struct FileLocker {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileLocker {
    pub fn new(dir: PathBuf, poll_interval: Duration) -> Self {
        Self { dir, poll_interval }
    }
}

#[async_trait]
impl Locker for FileLocker {
    async fn lock(&self, scope: CancellationToken, options: &LockOptions) -> Result<ElectionStream> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let lock = LockFile {
            path: self.dir.join(format!("{}.lock", options.key)),
            owner: Uuid::new_v4().to_string(),
            ttl: options.ttl,
        };
        info!(path = %lock.path.display(), owner = %lock.owner, "Contending for lock file");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(contend(lock, self.poll_interval, tx, scope));
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

async fn contend(
    lock: LockFile,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<bool>,
    scope: CancellationToken,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut held: Option<bool> = None;

    loop {
        tokio::select! {
            biased;
            () = scope.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let attempt = if held == Some(true) {
            lock.refresh().await
        } else {
            lock.try_acquire().await
        };
        let holding = attempt.unwrap_or_else(|e| {
            warn!(path = %lock.path.display(), error = %e, "Lock file check failed");
            false
        });

        if held != Some(holding) {
            if held == Some(true) {
                warn!(path = %lock.path.display(), "Lock file lost");
            }
            held = Some(holding);
            if tx.send(holding).is_err() {
                break;
            }
        }
    }

    if held == Some(true) {
        if let Err(e) = lock.release().await {
            warn!(path = %lock.path.display(), error = %e, "Failed to release lock file");
        }
    }
}

struct LockFile {
    path: PathBuf,
    owner: String,
    ttl: Duration,
}

impl LockFile {
    async fn try_acquire(&self) -> std::io::Result<bool> {
        if self.create().await? {
            return Ok(true);
        }
        if !self.is_stale().await? {
            return Ok(false);
        }

        info!(path = %self.path.display(), "Taking over stale lock file");
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.create().await
    }

    /// Create the lock file; `false` if someone else already has.
    async fn create(&self) -> std::io::Result<bool> {
        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;
        match created {
            Ok(mut file) => {
                file.write_all(self.owner.as_bytes()).await?;
                file.sync_all().await?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn is_stale(&self) -> std::io::Result<bool> {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e),
        };
        Ok(modified.elapsed().is_ok_and(|age| age > self.ttl))
    }

    /// Confirm the file is still ours and push its expiry forward.
    async fn refresh(&self) -> std::io::Result<bool> {
        if !self.is_owned().await? {
            return Ok(false);
        }
        tokio::fs::write(&self.path, self.owner.as_bytes()).await?;
        Ok(true)
    }

    async fn release(&self) -> std::io::Result<()> {
        if self.is_owned().await? {
            tokio::fs::remove_file(&self.path).await?;
            debug!(path = %self.path.display(), "Released lock file");
        }
        Ok(())
    }

    async fn is_owned(&self) -> std::io::Result<bool> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.trim() == self.owner),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
