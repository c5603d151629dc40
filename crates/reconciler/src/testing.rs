//! Deterministic backend doubles.
//!
//! These implement the backend traits in memory so the leader runner, the
//! reconciler and the removal queue can be driven step by step, with
//! injected failures and flapping sources, on a paused tokio clock.
//!
//! ## Example
//!
//! ```ignore
//! use targetsync_reconciler::testing::{ChannelLocker, ChannelSource, RecordingDestination};
//!
//! let (locker, elections) = ChannelLocker::new();
//! let source = ChannelSource::new(vec![Target::new("10.0.0.1")]);
//! let destination = RecordingDestination::default();
//!
//! elections.send(true)?;
//! // ... run a LeaderRunner, then inspect destination.additions()
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use targetsync_core::{
    ElectionStream, Error, LockOptions, Locker, Result, SnapshotStream, Target,
    TargetDestination, TargetKey, TargetSource,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::{UnboundedReceiverStream, WatchStream};
use tokio_util::sync::CancellationToken;

/// Locker whose election signals are pushed by the test.
#[derive(Debug)]
pub struct ChannelLocker {
    elections: Mutex<Option<mpsc::UnboundedReceiver<bool>>>,
    fail: bool,
}

impl ChannelLocker {
    /// Create a locker and the sender that drives its election signals.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedSender<bool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let locker = Self {
            elections: Mutex::new(Some(rx)),
            fail: false,
        };
        (locker, tx)
    }

    /// Create a locker whose lock request always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            elections: Mutex::new(None),
            fail: true,
        }
    }
}

#[async_trait]
impl Locker for ChannelLocker {
    async fn lock(
        &self,
        _scope: CancellationToken,
        options: &LockOptions,
    ) -> Result<ElectionStream> {
        if self.fail {
            return Err(Error::lock_failed(format!("lock '{}' unavailable", options.key)));
        }
        let rx = self
            .elections
            .lock()
            .take()
            .ok_or_else(|| Error::backend("channel", "lock already requested"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Source that replays the latest published snapshot to every subscriber.
///
/// A new subscription first receives the current snapshot, then each later
/// [`publish`](Self::publish). Rapid publishes may be coalesced into the
/// newest one, which a level-triggered reconciler does not mind.
#[derive(Debug)]
pub struct ChannelSource {
    snapshots: watch::Sender<Vec<Target>>,
    subscriptions: AtomicUsize,
    fail: bool,
}

impl ChannelSource {
    /// Create a source whose first snapshot is `initial`.
    #[must_use]
    pub fn new(initial: Vec<Target>) -> Self {
        let (snapshots, _) = watch::channel(initial);
        Self {
            snapshots,
            subscriptions: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Create a source whose subscription always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Publish a new full snapshot.
    pub fn publish(&self, targets: Vec<Target>) {
        self.snapshots.send_replace(targets);
    }

    /// Number of successful subscriptions so far.
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetSource for ChannelSource {
    async fn subscribe(&self, _scope: CancellationToken) -> Result<SnapshotStream> {
        if self.fail {
            return Err(Error::subscribe_failed("registry unreachable"));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(WatchStream::new(self.snapshots.subscribe())))
    }
}

/// Kind of destination call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationOp {
    Get,
    Add,
    Remove,
}

/// One recorded destination call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationCall {
    pub op: DestinationOp,
    pub targets: Vec<Target>,
    pub at: Instant,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct DestinationState {
    targets: BTreeMap<TargetKey, Target>,
    calls: Vec<DestinationCall>,
    fail_reads: bool,
    fail_adds: bool,
    removal_failures: usize,
}

impl DestinationState {
    fn record(&mut self, op: DestinationOp, targets: &[Target], succeeded: bool) {
        self.calls.push(DestinationCall {
            op,
            targets: targets.to_vec(),
            at: Instant::now(),
            succeeded,
        });
    }
}

/// In-memory destination that records every call.
#[derive(Debug, Default)]
pub struct RecordingDestination {
    state: Mutex<DestinationState>,
}

impl RecordingDestination {
    /// Create a destination already holding `targets`.
    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let destination = Self::default();
        destination
            .state
            .lock()
            .targets
            .extend(targets.into_iter().map(|t| (t.key(), t)));
        destination
    }

    /// Make every `get_targets` call fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Make every `add_targets` call fail (or succeed again).
    pub fn fail_adds(&self, fail: bool) {
        self.state.lock().fail_adds = fail;
    }

    /// Make the next `count` `remove_targets` calls fail.
    pub fn fail_next_removals(&self, count: usize) {
        self.state.lock().removal_failures = count;
    }

    /// Current contents.
    #[must_use]
    pub fn targets(&self) -> Vec<Target> {
        self.state.lock().targets.values().cloned().collect()
    }

    /// Every call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<DestinationCall> {
        self.state.lock().calls.clone()
    }

    /// Successful `add_targets` calls.
    #[must_use]
    pub fn additions(&self) -> Vec<DestinationCall> {
        self.filter(|c| c.op == DestinationOp::Add && c.succeeded)
    }

    /// Successful `remove_targets` calls.
    #[must_use]
    pub fn removals(&self) -> Vec<DestinationCall> {
        self.filter(|c| c.op == DestinationOp::Remove && c.succeeded)
    }

    /// Every `remove_targets` call, failed ones included.
    #[must_use]
    pub fn removal_attempts(&self) -> Vec<DestinationCall> {
        self.filter(|c| c.op == DestinationOp::Remove)
    }

    /// Every mutating call, failed ones included.
    #[must_use]
    pub fn writes(&self) -> Vec<DestinationCall> {
        self.filter(|c| c.op != DestinationOp::Get)
    }

    fn filter(&self, keep: impl Fn(&DestinationCall) -> bool) -> Vec<DestinationCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| keep(c))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TargetDestination for RecordingDestination {
    async fn get_targets(&self) -> Result<Vec<Target>> {
        let mut state = self.state.lock();
        let fail = state.fail_reads;
        state.record(DestinationOp::Get, &[], !fail);
        if fail {
            return Err(Error::backend("recording", "describe targets failed"));
        }
        Ok(state.targets.values().cloned().collect())
    }

    async fn add_targets(&self, targets: &[Target]) -> Result<()> {
        let mut state = self.state.lock();
        let fail = state.fail_adds;
        state.record(DestinationOp::Add, targets, !fail);
        if fail {
            return Err(Error::backend("recording", "register targets failed"));
        }
        state
            .targets
            .extend(targets.iter().map(|t| (t.key(), t.clone())));
        Ok(())
    }

    async fn remove_targets(&self, targets: &[Target]) -> Result<()> {
        let mut state = self.state.lock();
        let fail = state.removal_failures > 0;
        state.record(DestinationOp::Remove, targets, !fail);
        if fail {
            state.removal_failures = state.removal_failures.saturating_sub(1);
            return Err(Error::backend("recording", "deregister targets failed"));
        }
        for target in targets {
            state.targets.remove(&target.key());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_channel_source_replays_latest_snapshot() {
        let source = ChannelSource::new(vec![Target::new("10.0.0.1")]);
        source.publish(vec![Target::new("10.0.0.2")]);

        let mut stream = source.subscribe(CancellationToken::new()).await.unwrap();

        assert_eq!(stream.next().await, Some(vec![Target::new("10.0.0.2")]));
        assert_eq!(source.subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_channel_locker_is_single_use() {
        let (locker, _tx) = ChannelLocker::new();
        let options = LockOptions::default();

        assert!(locker.lock(CancellationToken::new(), &options).await.is_ok());
        assert!(locker.lock(CancellationToken::new(), &options).await.is_err());
    }

    #[tokio::test]
    async fn test_recording_destination_failure_budget() {
        let destination = RecordingDestination::with_targets([Target::new("10.0.0.1")]);
        destination.fail_next_removals(1);

        assert!(destination.remove_targets(&[Target::new("10.0.0.1")]).await.is_err());
        assert!(destination.remove_targets(&[Target::new("10.0.0.1")]).await.is_ok());
        assert!(destination.targets().is_empty());
        assert_eq!(destination.removal_attempts().len(), 2);
        assert_eq!(destination.removals().len(), 1);
    }
}
