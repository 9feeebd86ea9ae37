use anyhow::Result;
use clap::Parser;

use logharbor_core::config::LogharborConfig;
use logharbor_daemon::cli::DaemonCli;
use logharbor_daemon::logging;
use logharbor_daemon::orchestrator::{self, Orchestrator, RunOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드: 파일 -> 환경변수 -> CLI 순으로 덮어씀
    let mut config = match &cli.config {
        Some(path) => LogharborConfig::from_file(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?,
        None => LogharborConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.validate {
        let rules = orchestrator::validate_config(&config).await?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        eprintln!("configuration is valid ({rules} rules in rules file)");
        return Ok(());
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    logging::init_tracing(&config.general)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "logharbor-daemon starting");

    let mut daemon = Orchestrator::build_from_config(config)?.with_format_hint(cli.format_hint);
    match daemon.run().await? {
        RunOutcome::EndOfInput(stats) => {
            tracing::info!(
                lines = stats.lines_read,
                accepted = stats.accepted,
                "stdin closed"
            );
        }
        RunOutcome::Signal(signal) => {
            tracing::info!(signal, "stopped by signal");
        }
    }

    Ok(())
}
