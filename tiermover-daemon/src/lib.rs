//! # tiermover daemon
//!
//! Wires the configuration, the Jellyfin ledger and the eviction cycle into
//! a long-running process. The binary in `main.rs` is a thin shell over
//! [`cli`], [`telemetry`] and [`runner`].

pub mod cli;
pub mod runner;
pub mod telemetry;

pub use cli::Cli;
pub use runner::{Daemon, build_cycle, shutdown_signal};
pub use telemetry::{DEFAULT_LOG_FILTER, init_tracing, rolling_appender};
