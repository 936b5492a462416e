use std::fmt;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use statewire_frame::frame_bytes;
use tracing::debug;

use crate::error::Result;
use crate::listener::DebugListener;
use crate::manager::{ConnectionId, ConnectionManager, ManagerConfig, PayloadProcessor};
use crate::payload::DebugSnapshot;

/// Debug server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Readiness poll interval of the connection queue.
    pub poll_interval: Duration,
    /// Largest accepted frame payload.
    pub max_payload_size: Option<usize>,
    /// Close connections whose outbound queue stops draining for this long.
    pub stall_timeout: Option<Duration>,
    /// Snapshots kept by the owner's history.
    pub history_limit: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            max_payload_size: None,
            stall_timeout: None,
            history_limit: None,
        }
    }
}

impl ServerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = Some(max);
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    /// The connection manager part of this config.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            poll_interval: self.poll_interval,
            max_payload_size: self.max_payload_size,
            stall_timeout: self.stall_timeout,
        }
    }
}

type JsonCallback = Arc<dyn Fn(ConnectionId, Value) + Send + Sync>;

/// Parses each payload as JSON and hands it to the owner.
pub struct JsonProcessor {
    connection: ConnectionId,
    on_json: JsonCallback,
}

impl JsonProcessor {
    pub fn new(connection: ConnectionId, on_json: JsonCallback) -> Self {
        Self {
            connection,
            on_json,
        }
    }
}

impl PayloadProcessor for JsonProcessor {
    fn process(&mut self, payload: Bytes) -> Result<()> {
        let value: Value = serde_json::from_slice(&payload)?;
        (self.on_json)(self.connection, value);
        Ok(())
    }
}

/// Build a processor factory that delivers decoded JSON to `on_json`.
pub fn json_processors(
    on_json: impl Fn(ConnectionId, Value) + Send + Sync + 'static,
) -> impl Fn(ConnectionId) -> Box<dyn PayloadProcessor> + Send + Sync + 'static {
    let on_json: JsonCallback = Arc::new(on_json);
    move |id| Box::new(JsonProcessor::new(id, Arc::clone(&on_json))) as Box<dyn PayloadProcessor>
}

/// Receives JSON documents from instrumented apps and pushes states back.
///
/// `on_json` runs on the connection queue; it must not block on the server.
#[derive(Clone)]
pub struct DebugServer {
    manager: ConnectionManager,
    config: ServerConfig,
}

impl DebugServer {
    /// Start a server whose connections live on a dedicated serial queue.
    pub fn new(
        config: ServerConfig,
        on_json: impl Fn(ConnectionId, Value) + Send + Sync + 'static,
    ) -> Result<Self> {
        let manager = ConnectionManager::spawn(config.manager_config(), json_processors(on_json))?;
        Ok(Self { manager, config })
    }

    /// Wrap an existing manager, whose processors the caller already chose.
    pub fn with_manager(manager: ConnectionManager, config: ServerConfig) -> Self {
        Self { manager, config }
    }

    /// Accept TCP debug sessions on `addr`.
    pub fn listen<A: ToSocketAddrs + fmt::Display>(&self, addr: A) -> Result<DebugListener> {
        DebugListener::bind(addr, self.manager.clone())
    }

    /// Frame `value` and queue it on every connection.
    pub fn write_json(&self, value: &Value) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        let frame = frame_bytes(&payload)?;
        debug!(bytes = payload.len(), "broadcasting json");
        self.manager.broadcast(frame);
        Ok(())
    }

    /// Ask every connected app to replace its state with the snapshot's.
    pub fn reset_to(&self, snapshot: &DebugSnapshot) -> Result<()> {
        self.write_json(&snapshot.state)
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.manager.connections()
    }

    pub fn connection_count(&self) -> usize {
        self.manager.connection_count()
    }

    pub fn disconnect(&self, id: ConnectionId) {
        self.manager.disconnect(id);
    }

    /// Close every connection.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use statewire_transport::memory::pipe;

    use super::*;
    use crate::executor::InlineExecutor;
    use crate::manager::Registry;

    type Seen = Arc<Mutex<Vec<(ConnectionId, Value)>>>;

    fn inline_server() -> (DebugServer, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let config = ServerConfig::default();
        let registry = Registry::new(
            config.manager_config(),
            json_processors(move |id, value| record.lock().unwrap().push((id, value))),
        );
        let manager = ConnectionManager::with_executor(Arc::new(InlineExecutor::new(registry)));
        (DebugServer::with_manager(manager, config), seen)
    }

    #[test]
    fn decoded_json_reaches_callback() {
        let (server, seen) = inline_server();
        let (source, sink, peer) = pipe();
        let id = server.manager().accept(Box::new(source), Box::new(sink));

        peer.send(&frame_bytes(br#"{"action":"Tap","state":{"n":1},"imageData":""}"#).unwrap());
        server.manager().poll();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, id);
        assert_eq!(seen[0].1["state"], json!({"n": 1}));
    }

    #[test]
    fn malformed_json_keeps_connection() {
        let (server, seen) = inline_server();
        let (source, sink, peer) = pipe();
        server.manager().accept(Box::new(source), Box::new(sink));

        peer.send(&frame_bytes(b"{oops").unwrap());
        peer.send(&frame_bytes(b"[1]").unwrap());
        server.manager().poll();

        assert_eq!(server.connection_count(), 1);
        assert_eq!(seen.lock().unwrap()[0].1, json!([1]));
    }

    #[test]
    fn reset_writes_state_frame_to_every_connection() {
        let (server, _seen) = inline_server();
        let (source_a, sink_a, peer_a) = pipe();
        let (source_b, sink_b, peer_b) = pipe();
        server.manager().accept(Box::new(source_a), Box::new(sink_a));
        server.manager().accept(Box::new(source_b), Box::new(sink_b));

        let snapshot = DebugSnapshot::new("Tap", json!({"n": 3}), b"");
        server.reset_to(&snapshot).unwrap();

        let expected = frame_bytes(br#"{"n":3}"#).unwrap();
        assert_eq!(peer_a.received(), expected);
        assert_eq!(peer_b.received(), expected);
    }

    #[test]
    fn config_builders() {
        let config = ServerConfig::default()
            .with_max_payload_size(1024)
            .with_stall_timeout(Duration::from_secs(3))
            .with_history_limit(10)
            .with_poll_interval(Duration::from_millis(1));

        let manager = config.manager_config();
        assert_eq!(manager.max_payload_size, Some(1024));
        assert_eq!(manager.stall_timeout, Some(Duration::from_secs(3)));
        assert_eq!(manager.poll_interval, Duration::from_millis(1));
        assert_eq!(config.history_limit, Some(10));
    }
}
