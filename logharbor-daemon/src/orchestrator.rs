//! Daemon orchestration -- assembly, stdin ingestion, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logharbor-daemon`.
//! It validates configuration, builds the log pipeline, runs the stdin
//! collector and drives graceful shutdown.
//!
//! # Run Sequence
//!
//! 1. Start the pipeline (rules file is loaded here)
//! 2. Spawn the uptime updater (when metrics are enabled)
//! 3. Collect stdin until EOF or a shutdown signal
//! 4. Stop the pipeline (workers drain what is left in the buffer)

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use logharbor_core::config::LogharborConfig;
use logharbor_core::pipeline::{HealthStatus, Pipeline};
use logharbor_pipeline::{
    CollectorStats, LogPipeline, LogPipelineBuilder, LoggingListener, PipelineConfig,
    RuleLoader,
};

use crate::metrics_server;

/// Source name attached to records read from stdin.
pub const STDIN_SOURCE: &str = "stdin";

/// Why the ingestion loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Input stream reached EOF.
    EndOfInput(CollectorStats),
    /// A shutdown signal arrived first.
    Signal(&'static str),
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogharborConfig,
    /// The log pipeline.
    pipeline: LogPipeline,
    /// Parser hint for the stdin collector.
    format_hint: Option<String>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    ///
    /// # Errors
    ///
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogharborConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    ///
    /// Installs the metrics recorder when `[metrics] enabled = true`.
    pub fn build_from_config(config: LogharborConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let pipeline_config = PipelineConfig::from_core(&config)
            .map_err(|e| anyhow::anyhow!("invalid pipeline config: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let pipeline = LogPipelineBuilder::new()
            .config(pipeline_config)
            .listener(Arc::new(LoggingListener))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {}", e))?;

        tracing::info!(
            buffer_capacity = config.buffer.capacity,
            store_capacity = config.store.capacity,
            workers = config.processor.workers,
            "log pipeline initialized"
        );

        Ok(Self {
            config,
            pipeline,
            format_hint: None,
            start_time: Instant::now(),
        })
    }

    /// Set the parser hint used for stdin lines.
    pub fn with_format_hint(mut self, hint: Option<String>) -> Self {
        self.format_hint = hint;
        self
    }

    /// Ingest stdin until EOF, SIGINT or SIGTERM, then shut down.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let signal = shutdown_signal()?;
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run_until(stdin, signal).await
    }

    /// Ingest `reader` until it ends or `shutdown` resolves, then stop the pipeline.
    ///
    /// The pipeline is stopped on every path, including collector I/O errors.
    pub async fn run_until<R, F>(&mut self, reader: R, shutdown: F) -> Result<RunOutcome>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = &'static str>,
    {
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start log pipeline: {}", e))?;

        let token = self.pipeline.shutdown_token();
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, token.clone()));

        let mut collector = self.pipeline.collector(STDIN_SOURCE);
        if let Some(hint) = &self.format_hint {
            collector = collector.with_format_hint(hint.as_str());
        }

        tracing::info!("logharbor-daemon running, reading stdin");

        let outcome = tokio::select! {
            result = collector.run(reader) => result.map(RunOutcome::EndOfInput),
            signal = shutdown => {
                tracing::info!(signal, "shutdown signal received");
                Ok(RunOutcome::Signal(signal))
            }
        };

        if let Err(e) = self.pipeline.stop().await {
            tracing::error!(error = %e, "failed to stop log pipeline");
        }

        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stats = self.pipeline.stats();
        tracing::info!(
            processed = stats.processed,
            stored = stats.store_size,
            dropped = stats.buffer_dropped,
            alerts = stats.alerts.total_triggers,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "logharbor-daemon shut down"
        );

        outcome.map_err(|e| anyhow::anyhow!("stdin collector failed: {}", e))
    }

    /// Current pipeline health.
    pub async fn health(&self) -> HealthStatus {
        self.pipeline.health_check().await
    }

    /// The underlying pipeline (buffer/store/engine handles).
    pub fn pipeline(&self) -> &LogPipeline {
        &self.pipeline
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogharborConfig {
        &self.config
    }
}

/// Validate a configuration without starting anything.
///
/// Also compiles the configured rules file so rule errors surface
/// at validation time. Returns the number of rules in that file.
pub async fn validate_config(config: &LogharborConfig) -> Result<usize> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    PipelineConfig::from_core(config)
        .map_err(|e| anyhow::anyhow!("invalid pipeline config: {}", e))?;

    let rules_file = config.alert.rules_file.trim();
    if rules_file.is_empty() {
        return Ok(0);
    }

    let rules = RuleLoader::load_path(rules_file)
        .await
        .map_err(|e| anyhow::anyhow!("invalid rules file: {}", e))?;
    Ok(rules.len())
}

/// Install SIGTERM/SIGINT handlers and return a future that resolves
/// with the name of the first signal received.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(
    start_time: Instant,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use logharbor_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                () = shutdown.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn uptime_updater_stops_on_cancel() {
        let token = CancellationToken::new();
        let task = spawn_uptime_updater(Instant::now(), token.clone());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(!task.is_finished());

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn validate_config_without_rules_file() {
        let count = validate_config(&LogharborConfig::default()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn validate_config_reports_bad_policy() {
        let mut config = LogharborConfig::default();
        config.buffer.backpressure = "spill".to_owned();
        assert!(validate_config(&config).await.is_err());
    }
}
