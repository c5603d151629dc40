//! Core types for targetsync.
//!
//! - [`Target`] and its identity [`TargetKey`]
//! - [`SyncConfig`] and the opaque [`LockOptions`]
//! - The backend capability traits [`Locker`], [`TargetSource`] and
//!   [`TargetDestination`]
//! - [`Error`] and [`Result`]

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod backend;
pub mod config;
pub mod error;
pub mod result;
pub mod target;

pub use backend::{ElectionStream, Locker, SnapshotStream, TargetDestination, TargetSource};
pub use config::{LockOptions, SyncConfig};
pub use error::Error;
pub use result::{Result, ResultExt};
pub use target::{Target, TargetKey};
