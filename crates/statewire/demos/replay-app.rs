//! A tiny instrumented "app" for trying the debugger by hand.
//!
//! ```text
//! statewire serve 127.0.0.1:9000           # terminal 1
//! cargo run --example replay-app -- 127.0.0.1:9000   # terminal 2
//! ```
//!
//! The app sends one snapshot per increment, then waits for the debugger to
//! push a state back (type `reset <index>` into `serve`) and adopts it.

use std::time::Duration;

use serde_json::json;
use statewire::server::{DebugClient, DebugSnapshot, ServerError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9000".to_string());
    let mut client = DebugClient::connect(addr.as_str())?;
    println!("connected to {}", client.peer_addr());

    let mut count: i64 = 0;
    client.send_snapshot(&DebugSnapshot::new("Launch", json!({ "count": count }), b""))?;
    for _ in 0..5 {
        count += 1;
        let snapshot = DebugSnapshot::new("Increment", json!({ "count": count }), b"");
        client.send_snapshot(&snapshot)?;
        println!("sent count={count}");
    }

    client.set_read_timeout(Some(Duration::from_secs(60)))?;
    loop {
        match client.recv_json() {
            Ok(state) => {
                count = state["count"].as_i64().unwrap_or(count);
                println!("debugger reset state, count={count}");
            }
            Err(ServerError::Timeout(_)) => {
                println!("no reset within a minute, exiting");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }
}
