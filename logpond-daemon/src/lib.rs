//! Logpond daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `logpond-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod lockfile;
pub mod logging;
pub mod orchestrator;
