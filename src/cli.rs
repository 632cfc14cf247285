// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `stagedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stagedag",
    version,
    about = "Run fan-in staging pipelines: producers, retries and a completion watcher.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Stagedag.toml")]
    pub config: String,

    /// Run the pipeline once and exit, ignoring its schedule.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STAGEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't run any task.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["stagedag"]);
        assert_eq!(args.config, "Stagedag.toml");
        assert!(!args.once);
        assert!(!args.dry_run);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn flags() {
        let args = CliArgs::parse_from([
            "stagedag",
            "--config",
            "etl/Stagedag.toml",
            "--once",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.config, "etl/Stagedag.toml");
        assert!(args.once);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
