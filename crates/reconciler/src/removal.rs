//! Delayed, cancellable removal of targets from the destination.
//!
//! A target that disappears from the source is not removed right away.
//! It is parked in [`PendingRemovals`] with a deadline of
//! `now + remove_delay`; if the source reports it again before the deadline
//! the removal is cancelled. This keeps a flapping target from churning the
//! destination.
//!
//! The [`RemovalQueue`] loop owns the pending set. The reconciler talks to it
//! only through a [`RemovalQueueHandle`], over a single ordered channel, so a
//! cancellation can never overtake the removal request it is meant to cancel.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use targetsync_core::{Error, Result, SyncConfig, Target, TargetDestination, TargetKey};
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the channel between the reconciler and the queue loop.
pub const QUEUE_CAPACITY: usize = 100;

/// How long the timer sleeps when nothing is pending.
const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// Position of an entry in the deadline order. The sequence number breaks
/// ties between equal deadlines in insertion order.
type Slot = (Instant, u64);

/// Result of [`PendingRemovals::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// The target is now pending. `earliest` is true when it became the
    /// entry with the nearest deadline.
    Inserted { earliest: bool },
    /// A removal for the same key was already pending; its deadline is kept.
    AlreadyPending,
}

/// Targets awaiting removal, ordered by deadline and indexed by key.
///
/// Both maps always hold exactly the same entries; a key appears at most once.
#[derive(Debug, Default)]
pub struct PendingRemovals {
    by_deadline: BTreeMap<Slot, Target>,
    by_key: HashMap<TargetKey, Slot>,
    next_seq: u64,
}

impl PendingRemovals {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `target` for removal at `deadline`.
    ///
    /// A key that is already pending keeps its original deadline, so a
    /// source that keeps reporting the same absence cannot postpone the
    /// removal forever.
    pub fn schedule(&mut self, target: Target, deadline: Instant) -> Scheduled {
        let key = target.key();
        if self.by_key.contains_key(&key) {
            return Scheduled::AlreadyPending;
        }

        let earliest = self.next_deadline().is_none_or(|head| deadline < head);
        let slot = (deadline, self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);

        self.by_deadline.insert(slot, target);
        self.by_key.insert(key, slot);
        Scheduled::Inserted { earliest }
    }

    /// Cancel the pending removal for `key`, returning the target if one existed.
    pub fn cancel(&mut self, key: &TargetKey) -> Option<Target> {
        let slot = self.by_key.remove(key)?;
        self.by_deadline.remove(&slot)
    }

    /// The entry with the nearest deadline.
    #[must_use]
    pub fn peek(&self) -> Option<(Instant, &Target)> {
        self.by_deadline
            .first_key_value()
            .map(|((deadline, _), target)| (*deadline, target))
    }

    /// Remove and return the entry with the nearest deadline.
    pub fn pop(&mut self) -> Option<(Instant, Target)> {
        let ((deadline, _), target) = self.by_deadline.pop_first()?;
        self.by_key.remove(&target.key());
        Some((deadline, target))
    }

    /// Nearest deadline, if anything is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.peek().map(|(deadline, _)| deadline)
    }

    /// Whether a removal is pending for `key`.
    #[must_use]
    pub fn contains(&self, key: &TargetKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Number of pending removals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Messages from the reconciler to the queue loop.
#[derive(Debug)]
enum Command {
    /// These keys are in the source; drop any pending removal for them.
    Present(Vec<TargetKey>),
    /// These targets left the source; remove them after the delay.
    Remove(Vec<Target>),
}

/// Sending side of a [`RemovalQueue`].
#[derive(Debug, Clone)]
pub struct RemovalQueueHandle {
    tx: mpsc::Sender<Command>,
}

impl RemovalQueueHandle {
    /// Cancel pending removals for keys that are present in the source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `scope` is cancelled while waiting for
    /// queue capacity or the queue loop has stopped.
    pub async fn mark_present(
        &self,
        keys: Vec<TargetKey>,
        scope: &CancellationToken,
    ) -> Result<()> {
        self.send(Command::Present(keys), scope).await
    }

    /// Request delayed removal of targets that left the source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `scope` is cancelled while waiting for
    /// queue capacity or the queue loop has stopped.
    pub async fn request_removal(
        &self,
        targets: Vec<Target>,
        scope: &CancellationToken,
    ) -> Result<()> {
        self.send(Command::Remove(targets), scope).await
    }

    async fn send(&self, command: Command, scope: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = scope.cancelled() => Err(Error::Cancelled),
            sent = self.tx.send(command) => sent.map_err(|_| Error::Cancelled),
        }
    }
}

/// Loop that debounces and performs destination removals.
pub struct RemovalQueue {
    destination: Arc<dyn TargetDestination>,
    remove_delay: Duration,
    retry_interval: Duration,
    pending: PendingRemovals,
    rx: mpsc::Receiver<Command>,
}

impl RemovalQueue {
    /// Create a queue and the handle used to feed it.
    #[must_use]
    pub fn new(
        destination: Arc<dyn TargetDestination>,
        config: &SyncConfig,
    ) -> (Self, RemovalQueueHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let queue = Self {
            destination,
            remove_delay: config.remove_delay,
            retry_interval: config.retry_interval,
            pending: PendingRemovals::new(),
            rx,
        };
        (queue, RemovalQueueHandle { tx })
    }

    /// Run until `scope` is cancelled.
    ///
    /// On cancellation every pending entry is abandoned without touching the
    /// destination. The next leader term recomputes them from the
    /// destination's real state.
    pub async fn run(mut self, scope: CancellationToken) {
        let timer = sleep(IDLE_INTERVAL);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                () = scope.cancelled() => {
                    debug!(abandoned = self.pending.len(), "Removal queue stopped");
                    return;
                }
                Some(command) = self.rx.recv() => self.handle(command, timer.as_mut()),
                () = &mut timer => self.on_timer(timer.as_mut(), &scope).await,
            }
        }
    }

    fn handle(&mut self, command: Command, mut timer: Pin<&mut Sleep>) {
        match command {
            Command::Present(keys) => {
                for key in keys {
                    if let Some(target) = self.pending.cancel(&key) {
                        debug!(target = %target, "Target re-added, removal cancelled");
                    }
                }
            }
            Command::Remove(targets) => {
                for target in targets {
                    let deadline = Instant::now() + self.remove_delay;
                    debug!(
                        target = %target,
                        delay_ms = self.remove_delay.as_millis(),
                        "Scheduling target for removal"
                    );
                    if let Scheduled::Inserted { earliest: true } =
                        self.pending.schedule(target, deadline)
                    {
                        timer.as_mut().reset(deadline);
                    }
                }
            }
        }
    }

    async fn on_timer(&mut self, mut timer: Pin<&mut Sleep>, scope: &CancellationToken) {
        let now = Instant::now();
        let Some((deadline, target)) = self.pending.peek().map(|(d, t)| (d, t.clone())) else {
            timer.as_mut().reset(now + IDLE_INTERVAL);
            return;
        };

        // Woken early, e.g. after an earlier head was cancelled.
        if deadline > now {
            timer.as_mut().reset(deadline);
            return;
        }

        let removed = tokio::select! {
            biased;
            () = scope.cancelled() => return,
            removed = self.destination.remove_targets(std::slice::from_ref(&target)) => removed,
        };

        match removed {
            Ok(()) => {
                self.pending.pop();
                info!(target = %target, "Target removed from destination");
                let next = self
                    .pending
                    .next_deadline()
                    .unwrap_or_else(|| Instant::now() + IDLE_INTERVAL);
                timer.as_mut().reset(next);
            }
            Err(e) => {
                warn!(
                    target = %target,
                    error = %e,
                    retry_ms = self.retry_interval.as_millis(),
                    "Target removal failed, will retry"
                );
                timer.as_mut().reset(Instant::now() + self.retry_interval);
            }
        }
    }
}
