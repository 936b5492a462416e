//! Transport for a remote time-travel debugger.
//!
//! An instrumented app streams one JSON snapshot per state transition to a
//! debugger over TCP; the debugger records them and can push any earlier
//! state back. Every message is a `0xCE`-signed, length-prefixed frame.
//!
//! # Crate Structure
//!
//! - [`transport`]: Non-blocking endpoints (TCP halves, in-memory pipes)
//! - [`frame`]: Frame codec, stream reader and stream writer
//! - [`server`]: Connection manager, debug server, history and client
//!   (behind the `server` feature)

/// Re-export transport types.
pub mod transport {
    pub use statewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use statewire_frame::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use statewire_server::*;
}
