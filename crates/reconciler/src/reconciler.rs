//! Reconciler implementation.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use targetsync_core::{Error, Result, SyncConfig, Target, TargetDestination, TargetSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::removal::{RemovalQueue, RemovalQueueHandle};
use crate::types::{SyncOutcome, TargetDiff};

/// Keeps the destination's target set equal to the source's.
///
/// Additions are applied as soon as a snapshot shows them. Removals go
/// through a [`RemovalQueue`] and only happen once a target has been absent
/// for the configured delay. One reconciler runs per leader term.
pub struct Reconciler {
    /// Sync configuration.
    config: Arc<SyncConfig>,
    /// Authoritative target set.
    source: Arc<dyn TargetSource>,
    /// Target set being kept in sync.
    destination: Arc<dyn TargetDestination>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        config: Arc<SyncConfig>,
        source: Arc<dyn TargetSource>,
        destination: Arc<dyn TargetDestination>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
        }
    }

    /// Run until `scope` is cancelled or a fatal error occurs.
    ///
    /// Starts a removal queue under a child of `scope` and stops it before
    /// returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `scope` is cancelled, and
    /// `SubscribeFailed`, `SourceClosed`, `DestinationRead` or
    /// `DestinationWrite` when the run has to be abandoned.
    pub async fn run(&self, scope: CancellationToken) -> Result<()> {
        let queue_scope = scope.child_token();
        let (queue, handle) = RemovalQueue::new(Arc::clone(&self.destination), &self.config);
        let queue_task = tokio::spawn(queue.run(queue_scope.clone()));

        let result = self.sync_loop(&scope, &handle).await;

        queue_scope.cancel();
        if let Err(e) = queue_task.await {
            warn!(error = %e, "Removal queue task failed");
        }
        result
    }

    async fn sync_loop(&self, scope: &CancellationToken, queue: &RemovalQueueHandle) -> Result<()> {
        let mut snapshots = until_cancelled(scope, self.source.subscribe(scope.clone()))
            .await?
            .map_err(Error::into_subscribe_failed)?;

        loop {
            debug!("Waiting for targets from source");
            let src_targets = until_cancelled(scope, snapshots.next())
                .await?
                .ok_or(Error::SourceClosed)?;
            debug!(count = src_targets.len(), "Received targets from source");

            self.sync_snapshot(&src_targets, scope, queue).await?;
        }
    }

    /// Reconcile one source snapshot against the destination.
    ///
    /// Pending removals for every source key are cancelled and additions are
    /// applied before any removal is requested.
    ///
    /// # Errors
    ///
    /// Fails if the destination cannot be read, the batch add fails, or
    /// `scope` is cancelled.
    pub async fn sync_snapshot(
        &self,
        src_targets: &[Target],
        scope: &CancellationToken,
        queue: &RemovalQueueHandle,
    ) -> Result<SyncOutcome> {
        let dst_targets = until_cancelled(scope, self.destination.get_targets())
            .await?
            .map_err(Error::destination_read)?;
        debug!(count = dst_targets.len(), "Fetched targets from destination");

        // TODO: compare ports once the destination can update a target in place.
        let diff = TargetDiff::compute(src_targets, &dst_targets);

        if !diff.present.is_empty() {
            queue.mark_present(diff.present, scope).await?;
        }

        if !diff.to_add.is_empty() {
            info!(count = diff.to_add.len(), targets = ?diff.to_add, "Adding targets to destination");
            until_cancelled(scope, self.destination.add_targets(&diff.to_add))
                .await?
                .map_err(|e| Error::destination_write("add_targets", e))?;
        }

        let outcome = SyncOutcome {
            added: diff.to_add.len(),
            scheduled_for_removal: diff.to_remove.len(),
        };

        if !diff.to_remove.is_empty() {
            debug!(count = diff.to_remove.len(), "Requesting delayed removal");
            queue.request_removal(diff.to_remove, scope).await?;
        }

        Ok(outcome)
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Await `fut` unless `scope` is cancelled first.
///
/// Cancellation is checked before `fut` is polled, so a call is never
/// started once the scope has been cancelled.
async fn until_cancelled<F: Future>(scope: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        () = scope.cancelled() => Err(Error::Cancelled),
        output = fut => Ok(output),
    }
}
