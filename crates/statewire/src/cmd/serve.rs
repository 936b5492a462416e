use std::io::BufRead;
use std::sync::mpsc;
use std::thread;

use serde_json::Value;
use statewire_server::{ConnectionId, DebugServer, DebugSnapshot, History, ServerConfig};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_history, print_snapshot, OutputFormat};

enum ServeEvent {
    Snapshot(ConnectionId, Value),
    Input(String),
    Stop,
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    List,
    Reset(usize),
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;
    let (tx, rx) = mpsc::channel();

    let snapshots = tx.clone();
    let server = DebugServer::new(config.clone(), move |id, value| {
        let _ = snapshots.send(ServeEvent::Snapshot(id, value));
    })
    .map_err(|err| server_error("server start failed", err))?;
    let listener = server
        .listen(args.addr.as_str())
        .map_err(|err| server_error("bind failed", err))?;
    info!(addr = %listener.local_addr(), "debug server ready");

    install_ctrlc_handler(tx.clone())?;
    spawn_console(tx)?;

    let mut history = match config.history_limit {
        Some(limit) => History::with_capacity(limit),
        None => History::new(),
    };
    let mut received = 0usize;

    while let Ok(event) = rx.recv() {
        match event {
            ServeEvent::Snapshot(id, value) => {
                let snapshot = match DebugSnapshot::from_value(value) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        warn!(connection = %id, error = %err, "ignoring invalid snapshot");
                        continue;
                    }
                };
                history.push(id, snapshot);
                let index = history.len() - 1;
                if let Some(entry) = history.get(index) {
                    print_snapshot(index, id, &entry.snapshot, format);
                }

                received = received.saturating_add(1);
                if args.count.is_some_and(|count| received >= count) {
                    break;
                }
            }
            ServeEvent::Input(line) => match parse_command(&line) {
                Some(Ok(command)) => run_command(command, &server, &mut history, format),
                Some(Err(message)) => warn!(input = %line.trim(), "{message}"),
                None => {}
            },
            ServeEvent::Stop => break,
        }
    }

    server.shutdown();
    drop(listener);
    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let mut config = ServerConfig::default();
    if let Some(max) = args.max_payload {
        config = config.with_max_payload_size(max);
    }
    if let Some(timeout) = &args.stall_timeout {
        config = config.with_stall_timeout(parse_duration(timeout)?);
    }
    if let Some(limit) = args.history_limit {
        config = config.with_history_limit(limit);
    }
    Ok(config)
}

fn parse_command(line: &str) -> Option<Result<ConsoleCommand, String>> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let parsed = match (command, words.next(), words.next()) {
        ("list", None, _) => Ok(ConsoleCommand::List),
        ("reset", Some(index), None) => index
            .parse()
            .map(ConsoleCommand::Reset)
            .map_err(|_| format!("invalid history index `{index}`")),
        ("reset", _, _) => Err("usage: reset <index>".to_string()),
        _ => Err(format!("unknown command `{command}` (expected `list` or `reset <index>`)")),
    };
    Some(parsed)
}

fn run_command(
    command: ConsoleCommand,
    server: &DebugServer,
    history: &mut History,
    format: OutputFormat,
) {
    match command {
        ConsoleCommand::List => print_history(history, format),
        ConsoleCommand::Reset(index) => {
            let Some(entry) = history.select(index) else {
                warn!(index, entries = history.len(), "no such history entry");
                return;
            };
            match server.reset_to(&entry.snapshot) {
                Ok(()) => info!(
                    index,
                    action = %entry.snapshot.action,
                    live = server.connection_count(),
                    "state pushed"
                ),
                Err(err) => warn!(index, error = %err, "failed to push state"),
            }
        }
    }
}

fn spawn_console(tx: mpsc::Sender<ServeEvent>) -> CliResult<()> {
    thread::Builder::new()
        .name("statewire-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(ServeEvent::Input(line)).is_err() {
                    break;
                }
            }
        })
        .map(|_| ())
        .map_err(|err| io_error("console thread failed", err))
}

fn install_ctrlc_handler(tx: mpsc::Sender<ServeEvent>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = tx.send(ServeEvent::Stop);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn serve_args() -> ServeArgs {
        ServeArgs {
            addr: "127.0.0.1:0".into(),
            count: None,
            history_limit: Some(5),
            max_payload: Some(4096),
            stall_timeout: Some("750ms".into()),
        }
    }

    #[test]
    fn parses_console_commands() {
        assert_eq!(parse_command("  list "), Some(Ok(ConsoleCommand::List)));
        assert_eq!(parse_command("reset 3"), Some(Ok(ConsoleCommand::Reset(3))));
        assert_eq!(parse_command(""), None);
        assert!(matches!(parse_command("reset"), Some(Err(_))));
        assert!(matches!(parse_command("reset x"), Some(Err(msg)) if msg.contains("`x`")));
        assert!(matches!(parse_command("jump 2"), Some(Err(_))));
    }

    #[test]
    fn flags_map_onto_server_config() {
        let config = server_config(&serve_args()).expect("valid flags");
        assert_eq!(config.history_limit, Some(5));
        assert_eq!(config.max_payload_size, Some(4096));
        assert_eq!(config.stall_timeout, Some(Duration::from_millis(750)));
    }

    #[test]
    fn bad_stall_timeout_is_rejected() {
        let mut args = serve_args();
        args.stall_timeout = Some("soon".into());
        assert!(server_config(&args).is_err());
    }
}
