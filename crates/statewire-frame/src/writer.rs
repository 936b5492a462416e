use std::io::ErrorKind;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use statewire_transport::{ByteSink, StreamEvent};
use tracing::{debug, trace};

/// Largest slice handed to the sink in one write call.
pub const WRITE_CHUNK_SIZE: usize = 1024;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

type EndCallback = Box<dyn FnOnce(Option<std::io::Error>) + Send>;

/// Flushes an outbound queue onto a non-blocking sink without ever blocking
/// the caller.
///
/// Bytes are queued by [`StreamWriter::write`] and drained whenever the sink
/// reports space. The end callback fires at most once, on the first terminal
/// condition: a sink error, a zero-byte write, or an end/error notification.
pub struct StreamWriter<K> {
    sink: K,
    remainder: BytesMut,
    on_end: Option<EndCallback>,
    last_progress: Instant,
}

impl<K: ByteSink> StreamWriter<K> {
    /// Create a writer. `on_end` is called once when the sink is finished.
    pub fn new(sink: K, on_end: impl FnOnce(Option<std::io::Error>) + Send + 'static) -> Self {
        Self {
            sink,
            remainder: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            on_end: Some(Box::new(on_end)),
            last_progress: Instant::now(),
        }
    }

    /// Open the underlying sink.
    pub fn open(&mut self) -> std::io::Result<()> {
        self.sink.open()
    }

    /// Close the underlying sink without invoking the end callback.
    pub fn close(&mut self) {
        self.on_end = None;
        self.remainder.clear();
        self.sink.close();
    }

    /// Queue `bytes` and try to flush immediately.
    ///
    /// Bytes written after the writer ended are discarded.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.is_ended() {
            trace!(bytes = bytes.len(), "discarding write after end");
            return;
        }
        if self.remainder.is_empty() {
            self.last_progress = Instant::now();
        }
        self.remainder.extend_from_slice(bytes);
        self.drain();
    }

    /// Dispatch a lifecycle notification from the sink.
    pub fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::OpenCompleted | StreamEvent::HasSpaceAvailable => self.drain(),
            StreamEvent::ErrorOccurred(err) => self.end(Some(err)),
            StreamEvent::EndEncountered => self.end(None),
            StreamEvent::HasBytesAvailable => {
                trace!(event = event.name(), "writer ignoring event");
            }
        }
    }

    /// Push as much of the queue as the sink will take right now.
    pub fn drain(&mut self) {
        while !self.is_ended() && self.sink.is_open() && !self.remainder.is_empty() {
            let len = self.remainder.len().min(WRITE_CHUNK_SIZE);
            match self.sink.write(&self.remainder[..len]) {
                Ok(0) => {
                    self.end(Some(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "sink accepted zero bytes",
                    )));
                }
                Ok(n) => {
                    trace!(bytes = n, "flushed chunk");
                    self.remainder.advance(n);
                    self.last_progress = Instant::now();
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => self.end(Some(err)),
            }
        }
    }

    /// Bytes queued but not yet accepted by the sink.
    pub fn pending(&self) -> usize {
        self.remainder.len()
    }

    /// When the sink last accepted bytes, or the queue last became non-empty.
    pub fn last_progress(&self) -> Instant {
        self.last_progress
    }

    /// Whether the writer has finished (ended or closed).
    pub fn is_ended(&self) -> bool {
        self.on_end.is_none()
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &K {
        &self.sink
    }

    fn end(&mut self, error: Option<std::io::Error>) {
        let Some(on_end) = self.on_end.take() else {
            return;
        };
        match &error {
            Some(err) => debug!(error = %err, pending = self.remainder.len(), "sink failed"),
            None => debug!(pending = self.remainder.len(), "sink reached end of stream"),
        }
        self.remainder.clear();
        on_end(error);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use statewire_transport::memory::{pipe, MemoryPeer, MemorySink};

    use super::*;

    type Ends = Arc<Mutex<Vec<Option<ErrorKind>>>>;

    fn recording_writer() -> (StreamWriter<MemorySink>, MemoryPeer, Ends) {
        let (_source, sink, peer) = pipe();
        let ends: Ends = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&ends);
        let mut writer = StreamWriter::new(sink, move |err| {
            record.lock().unwrap().push(err.map(|e| e.kind()));
        });
        writer.open().unwrap();
        (writer, peer, ends)
    }

    #[test]
    fn drains_everything_in_order_and_chunked() {
        let (mut writer, peer, ends) = recording_writer();

        let mut expected = Vec::new();
        for i in 0..7u8 {
            let block = vec![i; 700];
            expected.extend_from_slice(&block);
            writer.write(&block);
        }

        assert_eq!(peer.received().as_ref(), expected.as_slice());
        assert!(peer.write_sizes().iter().all(|&n| n <= WRITE_CHUNK_SIZE));
        assert_eq!(writer.pending(), 0);
        assert!(ends.lock().unwrap().is_empty());
    }

    #[test]
    fn partial_writes_keep_remainder() {
        let (mut writer, peer, _ends) = recording_writer();
        peer.set_space(Some(10));

        writer.write(b"0123456789abcdef");
        assert_eq!(peer.received().as_ref(), b"0123456789");
        assert_eq!(writer.pending(), 6);

        peer.grant(100);
        writer.handle_event(StreamEvent::HasSpaceAvailable);
        assert_eq!(peer.received().as_ref(), b"0123456789abcdef");
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn no_space_is_not_a_failure() {
        let (mut writer, peer, ends) = recording_writer();
        peer.set_space(Some(0));

        writer.write(b"queued");
        assert_eq!(writer.pending(), 6);
        assert!(!writer.is_ended());
        assert!(ends.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_byte_write_ends_once() {
        let (mut writer, peer, ends) = recording_writer();
        peer.accept_zero();

        writer.write(b"x");
        writer.write(b"y");
        writer.handle_event(StreamEvent::EndEncountered);

        assert_eq!(*ends.lock().unwrap(), vec![Some(ErrorKind::WriteZero)]);
        assert!(writer.is_ended());
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn write_error_ends_with_error() {
        let (mut writer, peer, ends) = recording_writer();
        peer.fail_writes(ErrorKind::BrokenPipe);

        writer.write(b"payload");

        assert_eq!(*ends.lock().unwrap(), vec![Some(ErrorKind::BrokenPipe)]);
    }

    #[test]
    fn sink_notifications_end_once() {
        let (mut writer, _peer, ends) = recording_writer();

        writer.handle_event(StreamEvent::EndEncountered);
        writer.handle_event(StreamEvent::ErrorOccurred(std::io::Error::from(
            ErrorKind::ConnectionReset,
        )));

        assert_eq!(*ends.lock().unwrap(), vec![None]);
    }

    #[test]
    fn open_completed_flushes_queued_bytes() {
        let (_source, sink, peer) = pipe();
        let mut writer = StreamWriter::new(sink, |_| {});

        writer.write(b"early");
        assert_eq!(writer.pending(), 5);

        writer.open().unwrap();
        writer.handle_event(StreamEvent::OpenCompleted);
        assert_eq!(peer.received().as_ref(), b"early");
    }

    #[test]
    fn close_suppresses_callback() {
        let (mut writer, peer, ends) = recording_writer();
        writer.close();
        writer.handle_event(StreamEvent::EndEncountered);
        writer.write(b"dropped");

        assert!(ends.lock().unwrap().is_empty());
        assert_eq!(peer.close_counts().1, 1);
        assert!(peer.received().is_empty());
    }
}
