//! Capability traits for the lock, source and destination backends.
//!
//! The syncer only ever talks to these traits, so any conforming
//! implementation can be plugged in: a discovery registry, a cloud
//! load balancer, or the deterministic doubles used in tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::config::LockOptions;
use crate::result::Result;
use crate::target::Target;

/// Stream of leadership signals: `true` when elected, `false` when lost.
pub type ElectionStream = Pin<Box<dyn Stream<Item = bool> + Send>>;

/// Stream of full target-set snapshots (never deltas).
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Vec<Target>> + Send>>;

/// Distributed lock with leader notifications.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Start contending for the lock.
    ///
    /// The returned stream yields a signal each time leadership changes. The
    /// backend stops producing and releases the lock once `scope` is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Fails only if the lock cannot be initialized.
    async fn lock(&self, scope: CancellationToken, options: &LockOptions)
    -> Result<ElectionStream>;
}

/// Authoritative set of targets, e.g. a service-discovery registry.
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// Subscribe to target-set snapshots.
    ///
    /// The source delivers an initial snapshot and one per later change,
    /// until `scope` is cancelled.
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be established.
    async fn subscribe(&self, scope: CancellationToken) -> Result<SnapshotStream>;
}

/// Target set that must mirror the source, e.g. a load-balancer target group.
///
/// All calls are full-batch: a failed call is treated as fully failed.
#[async_trait]
pub trait TargetDestination: Send + Sync {
    /// Read the destination's current full target set.
    ///
    /// # Errors
    ///
    /// Fails if the destination cannot be read.
    async fn get_targets(&self) -> Result<Vec<Target>>;

    /// Register targets with the destination.
    ///
    /// # Errors
    ///
    /// Fails if the batch could not be applied.
    async fn add_targets(&self, targets: &[Target]) -> Result<()>;

    /// Deregister targets from the destination.
    ///
    /// # Errors
    ///
    /// Fails if the batch could not be applied.
    async fn remove_targets(&self, targets: &[Target]) -> Result<()>;
}
