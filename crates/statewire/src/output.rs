use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use statewire_server::{ConnectionId, DebugSnapshot, History};

const STATE_PREVIEW_CHARS: usize = 60;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct SnapshotOutput<'a> {
    index: usize,
    connection: String,
    action: &'a str,
    state: &'a Value,
    image_size: usize,
    timestamp: String,
}

impl<'a> SnapshotOutput<'a> {
    fn new(index: usize, connection: ConnectionId, snapshot: &'a DebugSnapshot) -> Self {
        Self {
            index,
            connection: connection.to_string(),
            action: &snapshot.action,
            state: &snapshot.state,
            image_size: image_size(snapshot),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_snapshot(
    index: usize,
    connection: ConnectionId,
    snapshot: &DebugSnapshot,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = SnapshotOutput::new(index, connection, snapshot);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = snapshot_table();
            table.add_row(snapshot_row(index, connection, snapshot));
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{index} {connection} action={} image={}B state={}",
                snapshot.action,
                image_size(snapshot),
                state_preview(&snapshot.state)
            );
        }
        OutputFormat::Raw => print_raw_json(&snapshot.state),
    }
}

pub fn print_history(history: &History, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = snapshot_table();
            for (index, entry) in history.iter().enumerate() {
                table.add_row(snapshot_row(index, entry.connection, &entry.snapshot));
            }
            println!("{table}");
        }
        _ => {
            for (index, entry) in history.iter().enumerate() {
                let marker = if history.selected_index() == Some(index) {
                    "*"
                } else {
                    " "
                };
                match format {
                    OutputFormat::Json => {
                        let out = SnapshotOutput::new(index, entry.connection, &entry.snapshot);
                        println!(
                            "{}",
                            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                        );
                    }
                    _ => println!(
                        "{marker}#{index} {} action={}",
                        entry.connection, entry.snapshot.action
                    ),
                }
            }
        }
    }
}

/// Print a state pushed back by the debugger.
pub fn print_state(state: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_raw_json(state),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PUSHED STATE"])
                .add_row(vec![state.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(state).unwrap_or_else(|_| state.to_string())
            );
        }
    }
}

fn print_raw_json(value: &Value) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{value}");
    let _ = out.flush();
}

fn snapshot_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "CONNECTION", "ACTION", "IMAGE", "STATE"]);
    table
}

fn snapshot_row(index: usize, connection: ConnectionId, snapshot: &DebugSnapshot) -> Vec<String> {
    vec![
        index.to_string(),
        connection.to_string(),
        snapshot.action.clone(),
        format!("{}B", image_size(snapshot)),
        state_preview(&snapshot.state),
    ]
}

fn image_size(snapshot: &DebugSnapshot) -> usize {
    snapshot.image_bytes().map(|bytes| bytes.len()).unwrap_or(0)
}

fn state_preview(state: &Value) -> String {
    let text = state.to_string();
    if text.chars().count() <= STATE_PREVIEW_CHARS {
        return text;
    }
    let mut preview: String = text.chars().take(STATE_PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
