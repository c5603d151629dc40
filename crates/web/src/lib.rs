//! Readiness probe for targetsync.
//!
//! Serves `GET /ready`: 200 once the process has built its syncer, 500
//! before that. The flag lives in a [`Readiness`] cell owned by the binary.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod error;
mod readiness;
mod server;

pub use error::{Result, ServerError};
pub use readiness::Readiness;
pub use server::{create_router, serve};
