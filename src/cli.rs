//! CLI definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// targetsync - mirror service-discovery targets into a load-balancer target group
#[derive(Parser, Debug)]
#[command(name = "targetsync")]
#[command(version)]
#[command(about = "Keep a load-balancer target group in sync with a service-discovery source")]
#[command(
    long_about = "targetsync contends for a distributed lock and, while it holds it, adds new source targets to the destination immediately and removes departed ones only after they have been gone for the configured delay."
)]
pub struct Cli {
    /// Settings file (.toml, otherwise YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Log level; RUST_LOG overrides it when set
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Serve the readiness probe on this address
    #[arg(short, long)]
    pub bind_address: Option<SocketAddr>,
}

/// Accepted values for `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
