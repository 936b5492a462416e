use std::io::ErrorKind;

use bytes::Bytes;
use statewire_transport::{ByteSource, StreamEvent};
use tracing::{debug, trace};

/// Size of each read issued against the source.
pub const READ_CHUNK_SIZE: usize = 1024;

/// What a [`StreamReader`] hands to its handler.
#[derive(Debug)]
pub enum ReadEvent {
    /// A chunk of raw bytes, in arrival order.
    Data(Bytes),
    /// The source is finished. `None` is a clean end-of-stream; `Some` carries
    /// the failure. Delivered exactly once.
    Ended(Option<std::io::Error>),
}

type ReadHandler = Box<dyn FnMut(ReadEvent) + Send>;

/// Turns readiness notifications from a non-blocking source into chunk
/// deliveries.
///
/// After the end has been delivered the reader never touches the source
/// again.
pub struct StreamReader<S> {
    source: S,
    handler: ReadHandler,
    ended: bool,
}

impl<S: ByteSource> StreamReader<S> {
    /// Create a reader that delivers everything it reads to `handler`.
    pub fn new(source: S, handler: impl FnMut(ReadEvent) + Send + 'static) -> Self {
        Self {
            source,
            handler: Box::new(handler),
            ended: false,
        }
    }

    /// Open the underlying source.
    pub fn open(&mut self) -> std::io::Result<()> {
        self.source.open()
    }

    /// Close the underlying source. No further events are delivered.
    pub fn close(&mut self) {
        self.ended = true;
        self.source.close();
    }

    /// Dispatch a lifecycle notification from the source.
    pub fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::HasBytesAvailable => self.on_readable(),
            StreamEvent::ErrorOccurred(err) => self.finish(Some(err)),
            StreamEvent::EndEncountered => self.finish(None),
            StreamEvent::OpenCompleted | StreamEvent::HasSpaceAvailable => {
                trace!(event = event.name(), "reader ignoring event");
            }
        }
    }

    /// Read until the source has nothing more available right now.
    pub fn on_readable(&mut self) {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while !self.ended {
            match self.source.read(&mut chunk) {
                Ok(0) => self.finish(None),
                Ok(n) => {
                    trace!(bytes = n, "read chunk");
                    (self.handler)(ReadEvent::Data(Bytes::copy_from_slice(&chunk[..n])));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => self.finish(Some(err)),
            }
        }
    }

    /// Whether the end has been delivered.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    fn finish(&mut self, error: Option<std::io::Error>) {
        if self.ended {
            return;
        }
        self.ended = true;
        match &error {
            Some(err) => debug!(error = %err, "source failed"),
            None => debug!("source reached end of stream"),
        }
        (self.handler)(ReadEvent::Ended(error));
    }
}
