//! logpond-daemon entry point.
//!
//! Startup order:
//! 1. Parse CLI arguments
//! 2. Load configuration (file + environment overrides + CLI overrides)
//! 3. `--validate` short-circuits here
//! 4. Initialize tracing
//! 5. Acquire the lock file (another instance running exits cleanly)
//! 6. Build the orchestrator and run

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use logpond_daemon::cli::DaemonCli;
use logpond_daemon::lockfile::LockFile;
use logpond_daemon::logging::init_tracing;
use logpond_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = logpond_core::config::LogpondConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config from {}: {}", cli.config.display(), e))?;

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(lock_file) = &cli.lock_file {
        config.general.lock_file = lock_file.clone();
    }

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "logpond-daemon starting"
    );

    let Some(_lock) = LockFile::acquire(Path::new(&config.general.lock_file))? else {
        // Another instance holds the lock. Not an error.
        return Ok(());
    };

    let orchestrator = Orchestrator::build_from_config(config).await?;

    if cli.once {
        orchestrator.run_once().await?;
    } else {
        orchestrator.run().await?;
    }

    tracing::info!("logpond-daemon stopped");
    Ok(())
}
