//! Pipeline orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logpond-daemon`.
//! It loads configuration, connects storage and the dedup cache, loads
//! parsing rules, and drives the queue consumer and the analyzer.
//!
//! # Degradation policy
//!
//! - Parsing rules are load-bearing: a missing or malformed rule file
//!   aborts startup.
//! - The dedup cache is not: a Redis connection failure logs a warning
//!   and the daemon runs without deduplication. The unique hash index
//!   in storage still prevents duplicate rows within committed data.
//! - Analysis rules degrade to an empty rule set.

use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use logpond_core::config::{LogpondConfig, QueueConfig};
use logpond_pipeline::{
    Analyzer, ConsumerConfig, Deduplicator, DrainSummary, LogParser, QueueConsumer,
    RedisDedupCache, RuleBook, SqliteStore,
};

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: LogpondConfig,
    consumer: QueueConsumer<SqliteStore, RedisDedupCache>,
    analyzer: Option<Analyzer<SqliteStore>>,
}

impl Orchestrator {
    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: LogpondConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        tracing::info!(url = %config.storage.database_url, "connecting record store");
        let store = SqliteStore::connect(&config.storage.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect record store: {}", e))?;

        let dedup = if config.storage.dedup_enabled {
            match RedisDedupCache::connect(&config.storage.redis_url).await {
                Ok(cache) => {
                    tracing::info!(url = %config.storage.redis_url, "dedup cache connected");
                    Some(Deduplicator::new(cache))
                }
                Err(e) => {
                    tracing::warn!(
                        url = %config.storage.redis_url,
                        error = %e,
                        "dedup cache unavailable, running without deduplication"
                    );
                    None
                }
            }
        } else {
            tracing::info!("deduplication disabled by configuration");
            None
        };

        let rules = RuleBook::load(&config.parser.rules_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load parsing rules: {}", e))?;
        let parser = LogParser::new(rules);

        let consumer = QueueConsumer::new(
            parser,
            store.clone(),
            dedup,
            consumer_config(&config.queue),
        )
        .map_err(|e| anyhow::anyhow!("failed to build queue consumer: {}", e))?;

        let analyzer = if config.analysis.enabled {
            let rules = Analyzer::<SqliteStore>::load_rules(&config.analysis.rules_path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to load analysis rules: {}", e))?;
            Some(Analyzer::new(store, rules))
        } else {
            None
        };

        tracing::info!("orchestrator initialized");

        Ok(Self {
            config,
            consumer,
            analyzer,
        })
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogpondConfig {
        &self.config
    }

    /// Drain the queue once and evaluate analysis rules.
    pub async fn run_once(&self) -> Result<DrainSummary> {
        let summary = self
            .consumer
            .process_available()
            .await
            .map_err(|e| anyhow::anyhow!("queue drain failed: {}", e))?;

        tracing::info!(
            files_committed = summary.files_committed,
            files_failed = summary.files_failed,
            records_committed = summary.records_committed,
            "queue drained"
        );

        self.evaluate_analysis().await;

        Ok(summary)
    }

    /// Poll the queue until a shutdown signal arrives.
    pub async fn run(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        spawn_signal_watcher(cancel.clone())?;

        let poll_interval = Duration::from_secs(self.config.queue.poll_interval_secs);

        loop {
            match self.consumer.process_available().await {
                Ok(summary) if summary.files_committed + summary.files_failed > 0 => {
                    tracing::info!(
                        files_committed = summary.files_committed,
                        files_failed = summary.files_failed,
                        records_committed = summary.records_committed,
                        "queue drain cycle complete"
                    );
                    self.evaluate_analysis().await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "queue drain cycle failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    async fn evaluate_analysis(&self) {
        let Some(analyzer) = &self.analyzer else {
            return;
        };

        for finding in analyzer.evaluate().await {
            tracing::warn!(
                finding_id = %finding.id,
                rule = %finding.rule_name,
                matches = finding.records.len(),
                "analysis finding"
            );
        }
    }
}

fn consumer_config(queue: &QueueConfig) -> ConsumerConfig {
    ConsumerConfig {
        pending_dir: queue.pending_dir.clone().into(),
        processed_dir: queue.processed_dir.clone().into(),
        batch_size: queue.batch_size,
        poll_interval: Duration::from_secs(queue.poll_interval_secs),
    }
}

/// Spawn a task that cancels the token on SIGTERM or SIGINT.
fn spawn_signal_watcher(cancel: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    tokio::spawn(async move {
        let signal = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!(signal, "shutdown signal received");
        cancel.cancel();
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_config_mirrors_queue_section() {
        let queue = QueueConfig {
            pending_dir: "/q/pending".to_owned(),
            processed_dir: "/q/processed".to_owned(),
            batch_size: 42,
            poll_interval_secs: 7,
        };
        let config = consumer_config(&queue);
        assert_eq!(config.pending_dir, std::path::PathBuf::from("/q/pending"));
        assert_eq!(config.batch_size, 42);
        assert_eq!(config.poll_interval, Duration::from_secs(7));
    }
}
