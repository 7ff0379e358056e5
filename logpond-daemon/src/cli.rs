//! CLI argument definitions for logpond-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Logpond log collection daemon.
///
/// Consumes capture files from the queue directory, normalizes them
/// into CIM records, deduplicates, stores them, and evaluates
/// analysis rules.
#[derive(Parser, Debug)]
#[command(name = "logpond-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logpond.toml configuration file.
    #[arg(short, long, default_value = "/etc/logpond/logpond.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Drain the queue once and exit instead of polling continuously.
    #[arg(long)]
    pub once: bool,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override lock file path (takes precedence over config file).
    #[arg(long)]
    pub lock_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cli = DaemonCli::parse_from(["logpond-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/logpond/logpond.toml"));
        assert!(!cli.once);
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cli = DaemonCli::parse_from([
            "logpond-daemon",
            "--config",
            "/tmp/logpond.toml",
            "--log-level",
            "debug",
            "--once",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/logpond.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.once);
    }
}
