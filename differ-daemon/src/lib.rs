//! differ daemon library.
//!
//! Exposes the daemon's modules for integration testing.
//! In production, `differ-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod runner;
pub mod sinks;
