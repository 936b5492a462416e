//! Diagnostic logging for the CLI.
//!
//! Logs go to stderr so `serve` output on stdout stays machine-readable.
//! Connection and listener work runs on named threads (`statewire-connections`,
//! `statewire-listener`), so every line carries its thread name.

use clap::{Args, ValueEnum};
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Text,
    /// One JSON object per event, fields flattened.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Global logging flags, shared by every subcommand.
#[derive(Args, Debug, Clone, Copy)]
pub struct LogArgs {
    /// Log output format (stderr).
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "text",
        global = true
    )]
    pub format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "info",
        env = "STATEWIRE_LOG_LEVEL",
        global = true
    )]
    pub level: LogLevel,
}

impl LogArgs {
    /// Install the stderr subscriber. Returns `false` if a global subscriber
    /// was already set.
    pub fn install(self) -> bool {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(LevelFilter::from(self.level))
            .with_thread_names(true)
            .with_ansi(false)
            .with_target(false);

        let installed = match self.format {
            LogFormat::Text => subscriber.compact().try_init(),
            LogFormat::Json => subscriber.json().flatten_event(true).try_init(),
        };
        installed.is_ok()
    }
}
