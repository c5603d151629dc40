//! Leader election driving the reconciler.
//!
//! Only one instance across the fleet may write to the destination. The
//! [`LeaderRunner`] contends for the distributed lock and, for as long as it
//! holds it, keeps exactly one [`Reconciler`] running under its own child
//! scope. Losing the lock cancels that scope; the previous term is fully
//! drained before a new one can start.

use std::sync::Arc;

use futures::StreamExt;
use targetsync_core::{Error, Locker, Result, SyncConfig, TargetDestination, TargetSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconciler::Reconciler;

/// Leadership state of a [`LeaderRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    /// No lock requested yet.
    Unleashed,
    /// Lock requested, waiting for the first election signal.
    Contending,
    /// Elected; a reconciler is running.
    Leading,
    /// Not elected; nothing is running.
    Following,
    /// The runner has returned.
    Stopped,
}

impl std::fmt::Display for LeaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unleashed => write!(f, "unleashed"),
            Self::Contending => write!(f, "contending"),
            Self::Leading => write!(f, "leading"),
            Self::Following => write!(f, "following"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A running leader term: one reconciler under its own scope.
struct LeaderTerm {
    scope: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl LeaderTerm {
    /// Cancel the term and wait for it to drain.
    async fn stop(self) {
        self.scope.cancel();
        match self.task.await {
            Ok(Ok(()) | Err(Error::Cancelled)) => debug!("Leader term stopped"),
            Ok(Err(e)) => warn!(error = %e, "Leader term ended with error while stopping"),
            Err(e) => warn!(error = %e, "Leader term task failed"),
        }
    }
}

/// Owns the leadership state machine.
pub struct LeaderRunner {
    config: Arc<SyncConfig>,
    locker: Arc<dyn Locker>,
    reconciler: Arc<Reconciler>,
    state: watch::Sender<LeaderState>,
}

impl LeaderRunner {
    /// Create a runner over the given backends.
    pub fn new(
        config: Arc<SyncConfig>,
        locker: Arc<dyn Locker>,
        source: Arc<dyn TargetSource>,
        destination: Arc<dyn TargetDestination>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&config), source, destination));
        let (state, _) = watch::channel(LeaderState::Unleashed);
        Self {
            config,
            locker,
            reconciler,
            state,
        }
    }

    /// Subscribe to leadership state changes.
    pub fn state(&self) -> watch::Receiver<LeaderState> {
        self.state.subscribe()
    }

    /// Contend for the lock and run the reconciler while elected.
    ///
    /// Returns when `scope` is cancelled, the election stream ends, or a
    /// leader term fails. Any running term is stopped before returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `scope` is cancelled,
    /// [`Error::LockFailed`] if the lock cannot be initialized,
    /// [`Error::ElectionClosed`] if the lock backend stops signalling, or the
    /// error that ended a leader term.
    pub async fn run(&self, scope: CancellationToken) -> Result<()> {
        debug!(options = ?self.config.lock, "Requesting lock");
        self.set_state(LeaderState::Contending);

        let elections = tokio::select! {
            biased;
            () = scope.cancelled() => Err(Error::Cancelled),
            locked = self.locker.lock(scope.clone(), &self.config.lock) => {
                locked.map_err(Error::into_lock_failed)
            }
        };
        let mut elections = match elections {
            Ok(elections) => elections,
            Err(e) => {
                self.set_state(LeaderState::Stopped);
                return Err(e);
            }
        };

        let mut term: Option<LeaderTerm> = None;
        let result = loop {
            tokio::select! {
                biased;
                () = scope.cancelled() => break Err(Error::Cancelled),
                signal = elections.next() => match signal {
                    Some(true) => {
                        if let Some(previous) = term.take() {
                            warn!("Elected while already leading, restarting leader term");
                            previous.stop().await;
                        }
                        info!("Lock acquired, starting leader actions");
                        term = Some(self.start_term(&scope));
                        self.set_state(LeaderState::Leading);
                    }
                    Some(false) => {
                        info!("Lock lost, stopping leader actions");
                        if let Some(current) = term.take() {
                            current.stop().await;
                        }
                        self.set_state(LeaderState::Following);
                    }
                    None => break Err(Error::ElectionClosed),
                },
                ended = wait_for_term(&mut term) => {
                    term = None;
                    if let Err(e) = &ended {
                        error!(error = %e, "Leader term failed");
                    }
                    break ended;
                }
            }
        };

        if let Some(current) = term.take() {
            current.stop().await;
        }
        self.set_state(LeaderState::Stopped);
        result
    }

    fn start_term(&self, scope: &CancellationToken) -> LeaderTerm {
        let term_scope = scope.child_token();
        let reconciler = Arc::clone(&self.reconciler);
        let task = tokio::spawn({
            let term_scope = term_scope.clone();
            async move { reconciler.run(term_scope).await }
        });
        LeaderTerm {
            scope: term_scope,
            task,
        }
    }

    fn set_state(&self, state: LeaderState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Leadership state changed");
        }
    }
}

/// Resolve when the running term ends on its own; pend forever if none is running.
async fn wait_for_term(term: &mut Option<LeaderTerm>) -> Result<()> {
    match term {
        Some(current) => match (&mut current.task).await {
            Ok(result) => result,
            Err(e) => Err(Error::backend("reconciler", e.to_string())),
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::testing::{ChannelLocker, ChannelSource, RecordingDestination};

    #[tokio::test]
    async fn test_lock_failure_is_fatal() {
        let runner = LeaderRunner::new(
            Arc::new(SyncConfig::default()),
            Arc::new(ChannelLocker::failing()),
            Arc::new(ChannelSource::new(Vec::new())),
            Arc::new(RecordingDestination::default()),
        );
        let state = runner.state();

        let result = runner.run(CancellationToken::new()).await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::LockFailed { .. }));
        assert_eq!(err.to_string(), "failed to acquire lock: lock 'targetsync' unavailable");
        assert_eq!(*state.borrow(), LeaderState::Stopped);
    }

    #[tokio::test]
    async fn test_closed_election_stream_is_fatal() {
        let (locker, elections) = ChannelLocker::new();
        let runner = LeaderRunner::new(
            Arc::new(SyncConfig::default()),
            Arc::new(locker),
            Arc::new(ChannelSource::new(Vec::new())),
            Arc::new(RecordingDestination::default()),
        );
        drop(elections);

        let result = runner.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::ElectionClosed)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LeaderState::Leading.to_string(), "leading");
        assert_eq!(LeaderState::Unleashed.to_string(), "unleashed");
    }
}
