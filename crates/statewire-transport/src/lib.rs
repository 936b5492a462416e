//! Non-blocking stream endpoints for the statewire debug transport.
//!
//! Every accepted session is split into a readable half ([`ByteSource`]) and
//! a writable half ([`ByteSink`]). Both halves are non-blocking: a read or
//! write that cannot make progress returns `ErrorKind::WouldBlock`, and the
//! layer above waits for the next [`StreamEvent`] before trying again.
//!
//! This is the lowest layer of statewire. Implementations:
//! - TCP ([`TcpTransport`], [`TcpSource`], [`TcpSink`])
//! - In-process memory pipes ([`memory::pipe`]), used for wiring and tests

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{split, TcpSink, TcpSource, TcpTransport};
pub use traits::{ByteSink, ByteSource, Endpoint, StreamEvent};
