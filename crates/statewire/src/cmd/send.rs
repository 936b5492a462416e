use std::fs;

use serde_json::Value;
use statewire_server::{DebugClient, DebugSnapshot};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, server_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_state, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.wait_timeout)?;
    let snapshot = build_snapshot(&args)?;

    let mut client = DebugClient::connect_timeout(args.addr.as_str(), timeout)
        .map_err(|err| server_error("connect failed", err))?;
    client
        .send_snapshot(&snapshot)
        .map_err(|err| server_error("send failed", err))?;

    if args.wait {
        client
            .set_read_timeout(Some(timeout))
            .map_err(|err| server_error("receive failed", err))?;
        let state = client
            .recv_json()
            .map_err(|err| server_error("receive failed", err))?;
        print_state(&state, format);
    }

    client.close();
    Ok(SUCCESS)
}

fn build_snapshot(args: &SendArgs) -> CliResult<DebugSnapshot> {
    let state: Value = serde_json::from_str(&args.state)
        .map_err(|err| CliError::new(USAGE, format!("--state is not valid JSON: {err}")))?;
    let image = match &args.image {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => Vec::new(),
    };
    Ok(DebugSnapshot::new(args.action.clone(), state, &image))
}
