use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a debug server and print every snapshot received.
    Serve(ServeArgs),
    /// Act as an instrumented app: send one snapshot.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:9000).
    pub addr: String,
    /// Exit after receiving N snapshots.
    #[arg(long)]
    pub count: Option<usize>,
    /// Keep at most N snapshots in the history.
    #[arg(long, value_name = "N")]
    pub history_limit: Option<usize>,
    /// Close connections that send a frame larger than this.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
    /// Close connections whose outbound queue stops draining (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub stall_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Debug server address.
    pub addr: String,
    /// Action name recorded with the snapshot.
    #[arg(long, short = 'a')]
    pub action: String,
    /// Application state as JSON.
    #[arg(long, default_value = "{}")]
    pub state: String,
    /// Screenshot file attached to the snapshot.
    #[arg(long, value_name = "FILE")]
    pub image: Option<PathBuf>,
    /// Wait for the debugger to push a state back and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to connect, and to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
