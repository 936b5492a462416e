/// Ways a byte stream can break the framing protocol.
///
/// Every violation is terminal for the stream it was found on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// The byte at a frame boundary was not the 0xCE signature.
    #[error("invalid frame signature 0x{0:02X} (expected 0xCE)")]
    BadSignature(u8),

    /// The length field decoded to a negative value.
    #[error("negative frame length {0}")]
    NegativeLength(i32),

    /// The length field exceeds the configured maximum.
    #[error("frame length {len} exceeds maximum {max}")]
    Oversized { len: usize, max: usize },
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream broke the framing protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The payload does not fit in the 32-bit signed length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
