//! Leader-elected reconciliation of a destination target set.
//!
//! This crate keeps a destination (e.g. a load-balancer target group) equal
//! to a source (e.g. a service-discovery registry):
//!
//! - **LeaderRunner**: holds the distributed lock and runs one reconciler
//!   per leader term
//! - **Reconciler**: diffs every source snapshot against the destination,
//!   adds immediately, and hands removals to the queue
//! - **RemovalQueue**: removes a target only after it has been absent for
//!   `remove_delay`, cancelling the removal if it comes back
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use targetsync_core::SyncConfig;
//! use targetsync_reconciler::LeaderRunner;
//! use tokio_util::sync::CancellationToken;
//!
//! let runner = LeaderRunner::new(Arc::new(SyncConfig::default()), locker, source, destination);
//! let scope = CancellationToken::new();
//! runner.run(scope.clone()).await?;
//! ```

pub mod leader;
pub mod reconciler;
pub mod removal;
pub mod testing;
pub mod types;

pub use leader::{LeaderRunner, LeaderState};
pub use reconciler::Reconciler;
pub use removal::{PendingRemovals, RemovalQueue, RemovalQueueHandle, Scheduled};
pub use types::{SyncOutcome, TargetDiff};
