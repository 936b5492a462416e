use std::collections::VecDeque;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use statewire_frame::{frame_bytes, Decoded, FrameDecoder, FrameError, READ_CHUNK_SIZE};
use statewire_transport::{TcpTransport, TransportError};
use tracing::{debug, trace};

use crate::error::{Result, ServerError};
use crate::payload::DebugSnapshot;

/// The instrumented-app side of a debug session.
///
/// Blocking: sends snapshot frames to a debug server and waits for states
/// the debugger pushes back.
pub struct DebugClient {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
    ready: VecDeque<Bytes>,
    read_timeout: Option<Duration>,
}

impl DebugClient {
    /// Connect to a debug server.
    pub fn connect<A: ToSocketAddrs + fmt::Display>(addr: A) -> Result<Self> {
        Self::from_stream(TcpTransport::connect(addr)?)
    }

    /// Connect, giving up after `timeout`.
    pub fn connect_timeout<A: ToSocketAddrs + fmt::Display>(
        addr: A,
        timeout: Duration,
    ) -> Result<Self> {
        Self::from_stream(TcpTransport::connect_timeout(addr, timeout)?)
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr().map_err(TransportError::Io)?;
        Ok(Self {
            stream,
            peer,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            read_timeout: None,
        })
    }

    /// Address of the debug server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one snapshot.
    pub fn send_snapshot(&mut self, snapshot: &DebugSnapshot) -> Result<()> {
        self.send_payload(&snapshot.to_vec()?)
    }

    /// Send any JSON document.
    pub fn send_json(&mut self, value: &Value) -> Result<()> {
        self.send_payload(&serde_json::to_vec(value)?)
    }

    /// Frame and send raw payload bytes.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let frame = frame_bytes(payload)?;
        self.stream.write_all(&frame).map_err(TransportError::Io)?;
        trace!(peer = %self.peer, bytes = payload.len(), "sent frame");
        Ok(())
    }

    /// Bound how long [`recv_payload`](Self::recv_payload) waits. `None`
    /// waits forever.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(TransportError::Io)?;
        self.read_timeout = timeout;
        Ok(())
    }

    /// Wait for the next frame pushed by the server.
    pub fn recv_payload(&mut self) -> Result<Bytes> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Ok(payload);
            }
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!(peer = %self.peer, "server closed the session");
                    return Err(ServerError::Disconnected(self.peer.to_string()));
                }
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(ServerError::Timeout(self.read_timeout.unwrap_or_default()));
                }
                Err(err) => return Err(TransportError::Io(err).into()),
            };
            for decoded in self.decoder.feed(&chunk[..n]) {
                match decoded {
                    Decoded::Payload(payload) => self.ready.push_back(payload),
                    Decoded::Failure(violation) => {
                        return Err(FrameError::Protocol(violation).into());
                    }
                }
            }
        }
    }

    /// Wait for the next pushed frame and parse it as JSON.
    pub fn recv_json(&mut self) -> Result<Value> {
        let payload = self.recv_payload()?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Close both directions of the session.
    pub fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
