//! Configuration management

use crate::types::SyncError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════
// CLI Argument Parsing
// ═══════════════════════════════════════════════════════════

/// dirsync - one-way directory mirroring daemon
#[derive(Parser, Debug)]
#[command(name = "dirsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source directory
    pub source: PathBuf,

    /// Destination (copy) directory
    pub destination: PathBuf,

    /// Include names starting with '.'
    #[arg(long = "hidden")]
    pub hidden: bool,

    /// Synchronize empty directories
    #[arg(long = "copydirs")]
    pub copydirs: bool,

    /// Log to stdout/stderr instead of tmp/log.txt
    #[arg(long = "log2std")]
    pub log2std: bool,

    /// Run one cycle then exit
    #[arg(long = "once")]
    pub once: bool,

    /// Print PID to stdout at startup
    #[arg(long = "pid")]
    pub pid: bool,

    /// Minimum log level
    #[arg(long = "loglvl", default_value = "info")]
    pub loglvl: String,

    /// Cycle period in seconds, must be within [1, 10]
    #[arg(long = "scanperiod", default_value_t = 1)]
    pub scanperiod: u64,

    /// Worker count, must be within [1, 1000]
    #[arg(long = "workers")]
    pub workers: Option<usize>,
}

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(raw: &str) -> Result<Self, SyncError> {
        match raw {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(SyncError::Config(format!(
                "invalid -loglvl '{}': expected one of debug|info|warn|error",
                other
            ))),
        }
    }

    pub fn as_tracing_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Validated runtime configuration, built from `Cli` via `TryFrom`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub include_hidden: bool,
    pub include_empty_dirs: bool,
    pub log2std: bool,
    pub once: bool,
    pub print_pid: bool,
    pub log_level: LogLevel,
    pub scan_period: Duration,
    pub workers: usize,
}

const MIN_SCAN_PERIOD: Duration = Duration::from_secs(1);
const MAX_SCAN_PERIOD: Duration = Duration::from_secs(10);
const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 1000;

impl TryFrom<Cli> for Settings {
    type Error = SyncError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let source = cli
            .source
            .canonicalize()
            .map_err(|e| SyncError::Config(format!("source path {:?}: {}", cli.source, e)))?;
        let destination = cli.destination.canonicalize().map_err(|e| {
            SyncError::Config(format!("destination path {:?}: {}", cli.destination, e))
        })?;

        if !source.is_dir() {
            return Err(SyncError::Config(format!(
                "source {:?} is not a directory",
                source
            )));
        }
        if !destination.is_dir() {
            return Err(SyncError::Config(format!(
                "destination {:?} is not a directory",
                destination
            )));
        }
        if source == destination {
            return Err(SyncError::Config(
                "source and destination cannot be the same path".to_string(),
            ));
        }
        if destination.starts_with(&source) {
            return Err(SyncError::Config(format!(
                "destination {:?} is inside source {:?}",
                destination, source
            )));
        }

        let scan_period = Duration::from_secs(cli.scanperiod);
        if scan_period < MIN_SCAN_PERIOD || scan_period > MAX_SCAN_PERIOD {
            return Err(SyncError::Config(format!(
                "-scanperiod {}s out of range [1, 10]",
                cli.scanperiod
            )));
        }

        let workers = cli.workers.unwrap_or_else(num_cpus::get);
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(SyncError::Config(format!(
                "-workers {} out of range [1, 1000]",
                workers
            )));
        }

        let log_level = LogLevel::parse(&cli.loglvl)?;

        Ok(Settings {
            source,
            destination,
            include_hidden: cli.hidden,
            include_empty_dirs: cli.copydirs,
            log2std: cli.log2std,
            once: cli.once,
            print_pid: cli.pid,
            log_level,
            scan_period,
            workers,
        })
    }
}
