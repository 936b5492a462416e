use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::Endpoint;

/// TCP listener for debug sessions.
///
/// Binding and accepting is the only job here; advertising the endpoint is
/// left to whoever owns the listener.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr`. Port `0` picks a free port.
    pub fn bind<A: ToSocketAddrs + fmt::Display>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening for debug sessions");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking unless non-blocking mode is set).
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// Accept without blocking. Returns `Ok(None)` when nothing is pending.
    ///
    /// Requires [`TcpTransport::set_nonblocking`] to have been enabled.
    pub fn try_accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                // Accepted sockets may inherit the listener's mode on some platforms.
                stream.set_nonblocking(false)?;
                Ok(Some((stream, peer)))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Switch the listening socket between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Connect to a listening debug server (blocking).
    pub fn connect<A: ToSocketAddrs + fmt::Display>(addr: A) -> Result<TcpStream> {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected to debug server");
        Ok(stream)
    }

    /// Connect with a bound on how long the TCP handshake may take.
    pub fn connect_timeout<A: ToSocketAddrs + fmt::Display>(
        addr: A,
        timeout: std::time::Duration,
    ) -> Result<TcpStream> {
        let resolved = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::Unresolved(addr.to_string()))?;
        let stream =
            TcpStream::connect_timeout(&resolved, timeout).map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected to debug server");
        Ok(stream)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// Split an accepted stream into its readable and writable halves.
///
/// Both halves share one socket; each closes only its own direction.
pub fn split(stream: TcpStream) -> Result<(TcpSource, TcpSink)> {
    let peer = stream.peer_addr()?;
    let read_half = stream.try_clone()?;
    Ok((
        TcpSource {
            stream: read_half,
            peer,
            open: false,
        },
        TcpSink {
            stream,
            peer,
            open: false,
        },
    ))
}

/// Readable half of a TCP session.
pub struct TcpSource {
    stream: TcpStream,
    peer: SocketAddr,
    open: bool,
}

impl TcpSource {
    /// Remote address of the session.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Read for TcpSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(std::io::Error::new(
                ErrorKind::NotConnected,
                TransportError::Closed(self.peer),
            ));
        }
        self.stream.read(buf)
    }
}

impl Endpoint for TcpSource {
    fn open(&mut self) -> std::io::Result<()> {
        self.stream.set_nonblocking(true)?;
        self.open = true;
        trace!(peer = %self.peer, "source opened");
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(err) = self.stream.shutdown(Shutdown::Read) {
            if err.kind() != ErrorKind::NotConnected {
                debug!(peer = %self.peer, error = %err, "source shutdown failed");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl fmt::Debug for TcpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpSource")
            .field("peer", &self.peer)
            .field("open", &self.open)
            .finish()
    }
}

/// Writable half of a TCP session.
pub struct TcpSink {
    stream: TcpStream,
    peer: SocketAddr,
    open: bool,
}

impl TcpSink {
    /// Remote address of the session.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Write for TcpSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(std::io::Error::new(
                ErrorKind::NotConnected,
                TransportError::Closed(self.peer),
            ));
        }
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl Endpoint for TcpSink {
    fn open(&mut self) -> std::io::Result<()> {
        self.stream.set_nonblocking(true)?;
        self.stream.set_nodelay(true)?;
        self.open = true;
        trace!(peer = %self.peer, "sink opened");
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(err) = self.stream.shutdown(Shutdown::Write) {
            if err.kind() != ErrorKind::NotConnected {
                debug!(peer = %self.peer, error = %err, "sink shutdown failed");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl fmt::Debug for TcpSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpSink")
            .field("peer", &self.peer)
            .field("open", &self.open)
            .finish()
    }
}
