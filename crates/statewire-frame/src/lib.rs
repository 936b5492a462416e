//! Length-prefixed framing for the statewire debug transport.
//!
//! Every message is framed with:
//! - A 1-byte signature (0xCE) marking the frame boundary
//! - A 4-byte little-endian signed payload length
//! - The payload (a UTF-8 JSON document), exactly that many bytes
//!
//! Frames are concatenated back-to-back with no separators. The
//! [`FrameDecoder`] turns an append-only byte stream back into payloads; the
//! [`StreamReader`] and [`StreamWriter`] move bytes across non-blocking
//! endpoints without ever blocking their caller.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::DebugCodec;
pub use codec::{
    decode_frame, encode_frame, frame_bytes, Decoded, FrameDecoder, Frames, HEADER_SIZE,
    MAX_PAYLOAD_LEN, SIGNATURE,
};
pub use error::{FrameError, ProtocolViolation, Result};
pub use reader::{ReadEvent, StreamReader, READ_CHUNK_SIZE};
pub use writer::{StreamWriter, WRITE_CHUNK_SIZE};
