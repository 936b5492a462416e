use std::io::{Read, Write};

/// Lifecycle notification for one endpoint, as delivered by whatever drives
/// the I/O (a readiness poll, an event loop, or a test).
#[derive(Debug)]
pub enum StreamEvent {
    /// The endpoint finished opening.
    OpenCompleted,
    /// The source has bytes ready to read.
    HasBytesAvailable,
    /// The sink can accept more bytes.
    HasSpaceAvailable,
    /// The endpoint failed.
    ErrorOccurred(std::io::Error),
    /// The peer closed its side.
    EndEncountered,
}

impl StreamEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::OpenCompleted => "open-completed",
            StreamEvent::HasBytesAvailable => "has-bytes-available",
            StreamEvent::HasSpaceAvailable => "has-space-available",
            StreamEvent::ErrorOccurred(_) => "error-occurred",
            StreamEvent::EndEncountered => "end-encountered",
        }
    }
}

/// Open/close lifecycle shared by both halves of a session.
pub trait Endpoint {
    /// Open the endpoint and switch it to non-blocking mode.
    fn open(&mut self) -> std::io::Result<()>;

    /// Close the endpoint. Closing twice is a no-op.
    fn close(&mut self);

    /// Whether the endpoint is open.
    fn is_open(&self) -> bool;
}

impl<T: Endpoint + ?Sized> Endpoint for Box<T> {
    fn open(&mut self) -> std::io::Result<()> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// The readable half of a session.
///
/// `read` returns `Ok(0)` at end-of-stream and `ErrorKind::WouldBlock` when
/// no bytes are currently available.
pub trait ByteSource: Read + Endpoint + Send {}

impl<T: Read + Endpoint + Send> ByteSource for T {}

/// The writable half of a session.
///
/// `write` returns `ErrorKind::WouldBlock` when the sink has no space right
/// now; `Ok(0)` for a non-empty buffer means the sink is closed.
pub trait ByteSink: Write + Endpoint + Send {}

impl<T: Write + Endpoint + Send> ByteSink for T {}
