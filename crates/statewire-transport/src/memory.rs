//! In-process pipe endpoints.
//!
//! [`pipe`] returns a source/sink pair plus a [`MemoryPeer`] handle that plays
//! the remote side: it pushes inbound bytes, collects outbound bytes, limits
//! sink capacity and injects failures. The endpoints follow the same
//! non-blocking contract as the TCP halves.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Buf, Bytes, BytesMut};

use crate::traits::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Accept,
    Zero,
    Fail(ErrorKind),
}

#[derive(Debug)]
struct PipeState {
    inbound: BytesMut,
    inbound_finished: bool,
    read_failure: Option<ErrorKind>,
    outbound: BytesMut,
    write_sizes: Vec<usize>,
    write_mode: WriteMode,
    space: Option<usize>,
    source_open: bool,
    sink_open: bool,
    source_closes: usize,
    sink_closes: usize,
    open_failure: Option<ErrorKind>,
}

impl PipeState {
    fn new() -> Self {
        Self {
            inbound: BytesMut::new(),
            inbound_finished: false,
            read_failure: None,
            outbound: BytesMut::new(),
            write_sizes: Vec::new(),
            write_mode: WriteMode::Accept,
            space: None,
            source_open: false,
            sink_open: false,
            source_closes: 0,
            sink_closes: 0,
            open_failure: None,
        }
    }
}

type Shared = Arc<Mutex<PipeState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, PipeState> {
    // A panicking test thread must not wedge the other side of the pipe.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create a connected in-process endpoint pair.
pub fn pipe() -> (MemorySource, MemorySink, MemoryPeer) {
    let shared: Shared = Arc::new(Mutex::new(PipeState::new()));
    (
        MemorySource {
            shared: Arc::clone(&shared),
        },
        MemorySink {
            shared: Arc::clone(&shared),
        },
        MemoryPeer { shared },
    )
}

/// Readable half of an in-process pipe.
#[derive(Debug)]
pub struct MemorySource {
    shared: Shared,
}

impl Read for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = lock(&self.shared);
        if !state.source_open {
            return Err(ErrorKind::NotConnected.into());
        }
        if let Some(kind) = state.read_failure {
            return Err(kind.into());
        }
        if state.inbound.is_empty() {
            if state.inbound_finished {
                return Ok(0);
            }
            return Err(ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(state.inbound.len());
        buf[..n].copy_from_slice(&state.inbound[..n]);
        state.inbound.advance(n);
        Ok(n)
    }
}

impl Endpoint for MemorySource {
    fn open(&mut self) -> std::io::Result<()> {
        let mut state = lock(&self.shared);
        if let Some(kind) = state.open_failure {
            return Err(kind.into());
        }
        state.source_open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock(&self.shared);
        if state.source_open {
            state.source_open = false;
            state.source_closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.shared).source_open
    }
}

/// Writable half of an in-process pipe.
#[derive(Debug)]
pub struct MemorySink {
    shared: Shared,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = lock(&self.shared);
        if !state.sink_open {
            return Err(ErrorKind::NotConnected.into());
        }
        match state.write_mode {
            WriteMode::Accept => {}
            WriteMode::Zero => return Ok(0),
            WriteMode::Fail(kind) => return Err(kind.into()),
        }
        let n = match state.space {
            Some(0) if !buf.is_empty() => return Err(ErrorKind::WouldBlock.into()),
            Some(space) => buf.len().min(space),
            None => buf.len(),
        };
        if let Some(space) = state.space.as_mut() {
            *space -= n;
        }
        state.outbound.extend_from_slice(&buf[..n]);
        state.write_sizes.push(n);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Endpoint for MemorySink {
    fn open(&mut self) -> std::io::Result<()> {
        let mut state = lock(&self.shared);
        if let Some(kind) = state.open_failure {
            return Err(kind.into());
        }
        state.sink_open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock(&self.shared);
        if state.sink_open {
            state.sink_open = false;
            state.sink_closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.shared).sink_open
    }
}

/// Remote side of an in-process pipe.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Shared,
}

impl MemoryPeer {
    /// Queue bytes for the source to read.
    pub fn send(&self, data: &[u8]) {
        lock(&self.shared).inbound.extend_from_slice(data);
    }

    /// Signal end-of-stream once queued bytes are consumed.
    pub fn finish(&self) {
        lock(&self.shared).inbound_finished = true;
    }

    /// Make every subsequent read fail with `kind`.
    pub fn fail_reads(&self, kind: ErrorKind) {
        lock(&self.shared).read_failure = Some(kind);
    }

    /// Make every subsequent write fail with `kind`.
    pub fn fail_writes(&self, kind: ErrorKind) {
        lock(&self.shared).write_mode = WriteMode::Fail(kind);
    }

    /// Make every subsequent write accept zero bytes.
    pub fn accept_zero(&self) {
        lock(&self.shared).write_mode = WriteMode::Zero;
    }

    /// Limit how many more bytes the sink accepts before reporting `WouldBlock`.
    /// `None` removes the limit.
    pub fn set_space(&self, space: Option<usize>) {
        lock(&self.shared).space = space;
    }

    /// Grant additional sink space on top of the current limit.
    pub fn grant(&self, bytes: usize) {
        let mut state = lock(&self.shared);
        if let Some(space) = state.space.as_mut() {
            *space += bytes;
        }
    }

    /// Make `open` fail on both halves.
    pub fn fail_open(&self, kind: ErrorKind) {
        lock(&self.shared).open_failure = Some(kind);
    }

    /// Every byte the sink has accepted so far.
    pub fn received(&self) -> Bytes {
        Bytes::copy_from_slice(&lock(&self.shared).outbound)
    }

    /// Drain and return the bytes the sink has accepted so far.
    pub fn take_received(&self) -> Bytes {
        lock(&self.shared).outbound.split().freeze()
    }

    /// Size of every accepted write, in call order.
    pub fn write_sizes(&self) -> Vec<usize> {
        lock(&self.shared).write_sizes.clone()
    }

    /// Number of times the source and the sink were closed.
    pub fn close_counts(&self) -> (usize, usize) {
        let state = lock(&self.shared);
        (state.source_closes, state.sink_closes)
    }

    /// Whether both halves are currently open.
    pub fn is_open(&self) -> bool {
        let state = lock(&self.shared);
        state.source_open && state.sink_open
    }
}
