//! CLI argument definitions for logharbor-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// logharbor log ingestion daemon.
///
/// Reads log lines from stdin, parses them into structured records,
/// indexes them in memory and evaluates alert rules against each record.
#[derive(Parser, Debug)]
#[command(name = "logharbor-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logharbor.toml configuration file.
    ///
    /// When omitted, built-in defaults plus environment overrides are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

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

    /// Validate configuration (and the rules file, if any) and exit.
    #[arg(long)]
    pub validate: bool,

    /// Preferred parser for stdin lines (json, text).
    ///
    /// Other parsers are still tried when the preferred one fails.
    #[arg(long)]
    pub format_hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let cli = DaemonCli::try_parse_from(["logharbor-daemon"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
        assert!(!cli.validate);
        assert!(cli.format_hint.is_none());
    }

    #[test]
    fn parses_all_flags() {
        let cli = DaemonCli::try_parse_from([
            "logharbor-daemon",
            "--config",
            "/etc/logharbor/logharbor.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--validate",
            "--format-hint",
            "json",
        ])
        .unwrap();

        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/etc/logharbor/logharbor.toml"))
        );
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert!(cli.validate);
        assert_eq!(cli.format_hint.as_deref(), Some("json"));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(DaemonCli::try_parse_from(["logharbor-daemon", "--pid-file", "x"]).is_err());
    }
}
