//! Connection management, debug server and debug client for statewire.
//!
//! Instrumented apps connect to a [`DebugServer`] and stream one JSON
//! snapshot per frame. The server decodes every frame on a single serialized
//! queue, hands the JSON to its owner, and can push a state back to every
//! connected app.

pub mod client;
pub mod error;
pub mod executor;
pub mod history;
pub mod listener;
pub mod manager;
pub mod payload;
pub mod server;

pub use client::DebugClient;
pub use error::{Result, ServerError};
pub use executor::{Executor, InlineExecutor, Job, SerialQueue};
pub use history::{History, HistoryEntry};
pub use listener::DebugListener;
pub use manager::{
    ConnectionId, ConnectionManager, ManagerConfig, PayloadProcessor, ProcessorFactory, Registry,
    Side,
};
pub use payload::DebugSnapshot;
pub use server::{json_processors, DebugServer, JsonProcessor, ServerConfig};
