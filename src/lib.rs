#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # targetsync
//!
//! Keeps a load-balancer target group in sync with a service-discovery
//! source, with exactly one writer across the fleet.
//!
//! The sync logic lives in `targetsync-core` and `targetsync-reconciler`;
//! this crate adds the process around it: CLI, settings file, filesystem
//! backends and signal handling.

pub mod backends;
pub mod cli;
pub mod settings;
pub mod shutdown;

pub use targetsync_core;
pub use targetsync_reconciler;
