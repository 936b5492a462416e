//! Connection manager.
//!
//! The manager owns every accepted connection. Each connection pairs a
//! [`StreamReader`] feeding a [`FrameDecoder`] with a [`StreamWriter`] for
//! outbound bytes, plus a payload processor built for that connection.
//!
//! All connection state lives in a [`Registry`] owned by an [`Executor`].
//! [`ConnectionManager`] is a cheap, cloneable handle that marshals every
//! operation onto that executor as a job.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use bytes::Bytes;
use statewire_frame::{Decoded, FrameDecoder, ReadEvent, StreamReader, StreamWriter};
use statewire_transport::{ByteSink, ByteSource, StreamEvent, TransportError};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::executor::{Executor, SerialQueue};

/// Identifier of one accepted connection, unique per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which half of a connection a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Read,
    Write,
}

/// Consumes the decoded payloads of one connection.
///
/// Runs on the manager's execution context. An error is logged and the
/// connection stays open.
pub trait PayloadProcessor: Send {
    fn process(&mut self, payload: Bytes) -> Result<()>;
}

impl<F> PayloadProcessor for F
where
    F: FnMut(Bytes) -> Result<()> + Send,
{
    fn process(&mut self, payload: Bytes) -> Result<()> {
        self(payload)
    }
}

/// Builds the processor for a newly accepted connection.
pub type ProcessorFactory = Arc<dyn Fn(ConnectionId) -> Box<dyn PayloadProcessor> + Send + Sync>;

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Interval of the readiness poll on the serial queue.
    pub poll_interval: Duration,
    /// Largest accepted frame payload. `None` accepts any non-negative length.
    pub max_payload_size: Option<usize>,
    /// Close a connection whose writer has made no progress for this long.
    pub stall_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            max_payload_size: None,
            stall_timeout: None,
        }
    }
}

struct Connection {
    reader: StreamReader<Box<dyn ByteSource>>,
    writer: StreamWriter<Box<dyn ByteSink>>,
    closing: Arc<AtomicBool>,
}

/// The live connection set. Only ever touched from the manager's executor.
pub struct Registry {
    connections: BTreeMap<ConnectionId, Connection>,
    config: ManagerConfig,
    factory: ProcessorFactory,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(
        config: ManagerConfig,
        factory: impl Fn(ConnectionId) -> Box<dyn PayloadProcessor> + Send + Sync + 'static,
    ) -> Self {
        Self {
            connections: BTreeMap::new(),
            config,
            factory: Arc::new(factory),
        }
    }

    /// Wire up and open a connection. If either endpoint fails to open, both
    /// are closed, nothing is inserted and the open error is returned.
    pub fn accept(
        &mut self,
        id: ConnectionId,
        source: Box<dyn ByteSource>,
        sink: Box<dyn ByteSink>,
    ) -> std::io::Result<()> {
        let closing = Arc::new(AtomicBool::new(false));

        let mut decoder = match self.config.max_payload_size {
            Some(max) => FrameDecoder::with_max_payload(max),
            None => FrameDecoder::new(),
        };
        let mut processor = (self.factory)(id);
        let read_latch = Arc::clone(&closing);
        let reader = StreamReader::new(source, move |event| match event {
            ReadEvent::Data(chunk) => {
                for decoded in decoder.feed(&chunk) {
                    match decoded {
                        Decoded::Payload(payload) => {
                            trace!(connection = %id, bytes = payload.len(), "payload decoded");
                            if let Err(err) = processor.process(payload) {
                                warn!(connection = %id, error = %err, "payload rejected");
                            }
                        }
                        Decoded::Failure(violation) => {
                            warn!(connection = %id, error = %violation, "protocol violation");
                            read_latch.store(true, Ordering::Release);
                        }
                    }
                }
            }
            ReadEvent::Ended(err) => {
                match err {
                    Some(err) => debug!(connection = %id, error = %err, "read side failed"),
                    None => debug!(connection = %id, "peer closed read side"),
                }
                read_latch.store(true, Ordering::Release);
            }
        });

        let write_latch = Arc::clone(&closing);
        let writer = StreamWriter::new(sink, move |err| {
            match err {
                Some(err) => debug!(connection = %id, error = %err, "write side failed"),
                None => debug!(connection = %id, "peer closed write side"),
            }
            write_latch.store(true, Ordering::Release);
        });

        let mut connection = Connection {
            reader,
            writer,
            closing,
        };
        if let Err(err) = connection
            .reader
            .open()
            .and_then(|()| connection.writer.open())
        {
            connection.reader.close();
            connection.writer.close();
            return Err(err);
        }

        self.connections.insert(id, connection);
        info!(connection = %id, live = self.connections.len(), "connection accepted");
        Ok(())
    }

    /// Remove a connection and close both of its endpoints.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live connection.
    pub fn close_connection(&mut self, id: ConnectionId) {
        let Some(mut connection) = self.connections.remove(&id) else {
            panic!("unknown connection {id}");
        };
        connection.reader.close();
        connection.writer.close();
        info!(connection = %id, live = self.connections.len(), "connection closed");
    }

    /// Queue `bytes` on every live writer.
    pub fn broadcast(&mut self, bytes: &[u8]) {
        trace!(bytes = bytes.len(), live = self.connections.len(), "broadcast");
        for connection in self.connections.values_mut() {
            connection.writer.write(bytes);
        }
        self.sweep();
    }

    /// Deliver an I/O notification to one side of a connection.
    pub fn notify(&mut self, id: ConnectionId, side: Side, event: StreamEvent) {
        let Some(connection) = self.connections.get_mut(&id) else {
            trace!(connection = %id, event = event.name(), "event for closed connection ignored");
            return;
        };
        match side {
            Side::Read => connection.reader.handle_event(event),
            Side::Write => connection.writer.handle_event(event),
        }
        self.sweep();
    }

    /// Level-triggered readiness sweep, in connection order: read what is
    /// available and flush what is queued on every connection, then enforce
    /// the stall timeout.
    pub fn poll(&mut self) {
        let stall_timeout = self.config.stall_timeout;
        let now = Instant::now();
        for (id, connection) in self.connections.iter_mut() {
            connection.reader.handle_event(StreamEvent::HasBytesAvailable);
            connection.writer.handle_event(StreamEvent::HasSpaceAvailable);

            if let Some(limit) = stall_timeout {
                let pending = connection.writer.pending();
                let idle = now.saturating_duration_since(connection.writer.last_progress());
                if pending > 0 && idle > limit {
                    warn!(connection = %id, pending, idle = ?idle, "writer stalled");
                    connection.closing.store(true, Ordering::Release);
                }
            }
        }
        self.sweep();
    }

    /// Owner-initiated close. Closing an unknown or already-closed connection
    /// is a no-op.
    pub fn disconnect(&mut self, id: ConnectionId) {
        if self.connections.contains_key(&id) {
            self.close_connection(id);
        } else {
            debug!(connection = %id, "disconnect of closed connection ignored");
        }
    }

    /// Close every live connection.
    pub fn close_all(&mut self) {
        for id in self.ids() {
            self.close_connection(id);
        }
    }

    /// Live connection ids in ascending order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Bytes queued on a connection's writer, if it is live.
    pub fn pending(&self, id: ConnectionId) -> Option<usize> {
        self.connections.get(&id).map(|c| c.writer.pending())
    }

    /// Close every connection whose latch was tripped by its reader, writer
    /// or the stall check. Each tripped connection is closed exactly once.
    fn sweep(&mut self) {
        let tripped: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.closing.load(Ordering::Acquire))
            .map(|(id, _)| *id)
            .collect();
        for id in tripped {
            self.close_connection(id);
        }
    }
}

/// Cloneable handle to a connection set living on an executor.
///
/// Every method may be called from any thread. Queries block until the
/// executor answers, so they must not be called from a payload processor.
#[derive(Clone)]
pub struct ConnectionManager {
    executor: Arc<dyn Executor<Registry>>,
    next_id: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
}

impl ConnectionManager {
    /// Start a manager on its own serial queue, polling sockets every
    /// `config.poll_interval`.
    pub fn spawn(
        config: ManagerConfig,
        factory: impl Fn(ConnectionId) -> Box<dyn PayloadProcessor> + Send + Sync + 'static,
    ) -> Result<Self> {
        let interval = config.poll_interval;
        let registry = Registry::new(config, factory);
        let queue = SerialQueue::spawn_with_tick(
            "statewire-connections",
            registry,
            interval,
            Registry::poll,
        )
        .map_err(TransportError::Io)?;
        Ok(Self::with_executor(Arc::new(queue)))
    }

    /// Use an executor that already owns a [`Registry`].
    pub fn with_executor(executor: Arc<dyn Executor<Registry>>) -> Self {
        Self {
            executor,
            next_id: Arc::new(AtomicU64::new(1)),
            rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand an accepted session to the manager and return its identifier.
    ///
    /// The endpoints are opened on the executor; if that fails they are
    /// closed, the failure is logged and counted in
    /// [`rejected_count`](Self::rejected_count), and the identifier never
    /// becomes live.
    pub fn accept(&self, source: Box<dyn ByteSource>, sink: Box<dyn ByteSink>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let rejected = Arc::clone(&self.rejected);
        self.executor.execute(Box::new(move |registry: &mut Registry| {
            if let Err(err) = registry.accept(id, source, sink) {
                warn!(connection = %id, error = %err, "failed to open connection");
                rejected.fetch_add(1, Ordering::Relaxed);
            }
        }));
        id
    }

    /// Accepted sessions whose endpoints failed to open.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Queue `bytes` on every live connection. Never blocks on the sockets.
    pub fn broadcast(&self, bytes: Bytes) {
        self.executor
            .execute(Box::new(move |registry: &mut Registry| registry.broadcast(&bytes)));
    }

    /// Deliver an I/O notification to one side of a connection.
    pub fn notify(&self, id: ConnectionId, side: Side, event: StreamEvent) {
        self.executor.execute(Box::new(move |registry: &mut Registry| {
            registry.notify(id, side, event)
        }));
    }

    /// Run one readiness sweep now.
    pub fn poll(&self) {
        self.executor
            .execute(Box::new(|registry: &mut Registry| registry.poll()));
    }

    /// Close one connection. Idempotent.
    pub fn disconnect(&self, id: ConnectionId) {
        self.executor
            .execute(Box::new(move |registry: &mut Registry| registry.disconnect(id)));
    }

    /// Close every live connection.
    pub fn shutdown(&self) {
        self.executor
            .execute(Box::new(|registry: &mut Registry| registry.close_all()));
    }

    /// Live connection ids in ascending order.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.query(Registry::ids).unwrap_or_default()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.query(Registry::len).unwrap_or(0)
    }

    /// Bytes still queued for a connection, if it is live.
    pub fn pending(&self, id: ConnectionId) -> Option<usize> {
        self.query(move |registry| registry.pending(id)).flatten()
    }

    fn query<T: Send + 'static>(
        &self,
        f: impl FnOnce(&Registry) -> T + Send + 'static,
    ) -> Option<T> {
        let (tx, rx) = mpsc::channel();
        self.executor.execute(Box::new(move |registry: &mut Registry| {
            let _ = tx.send(f(&*registry));
        }));
        rx.recv().ok()
    }
}
