use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use statewire_transport::{split, TcpTransport, TransportError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manager::ConnectionManager;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Background TCP accept loop that hands every session to a
/// [`ConnectionManager`].
///
/// Dropping the listener stops the loop and closes the listening socket.
/// Accepted connections stay with the manager.
pub struct DebugListener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DebugListener {
    /// Bind `addr` and start accepting. Port `0` picks a free port.
    pub fn bind<A: ToSocketAddrs + fmt::Display>(addr: A, manager: ConnectionManager) -> Result<Self> {
        let transport = TcpTransport::bind(addr)?;
        transport.set_nonblocking(true)?;
        let local_addr = transport.local_addr();

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("statewire-listener".into())
            .spawn(move || accept_loop(&transport, &manager, &stop))
            .map_err(TransportError::Io)?;

        Ok(Self {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the accept loop to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(addr = %self.local_addr, "listener thread panicked");
            }
        }
    }
}

impl Drop for DebugListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(transport: &TcpTransport, manager: &ConnectionManager, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Acquire) {
        match transport.try_accept() {
            Ok(Some((stream, peer))) => match split(stream) {
                Ok((source, sink)) => {
                    let id = manager.accept(Box::new(source), Box::new(sink));
                    info!(connection = %id, %peer, "debug session accepted");
                }
                Err(err) => warn!(%peer, error = %err, "failed to split accepted stream"),
            },
            Ok(None) => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    debug!(addr = %transport.local_addr(), "accept loop stopped");
}
