use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::error::{FrameError, ProtocolViolation, Result};

/// Signature byte that opens every frame.
pub const SIGNATURE: u8 = 0xCE;

/// Frame header: signature (1) + length (4) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the signed 32-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = i32::MAX as usize;

/// Encode one frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬─────────────┬──────────────────┐
/// │ Signature │ Length      │ Payload           │
/// │ 0xCE (1B) │ (4B i32 LE) │ (Length bytes)    │
/// └───────────┴─────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(SIGNATURE);
    dst.put_i32_le(payload.len() as i32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode one frame into a fresh buffer.
pub fn frame_bytes(payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode one frame from a buffer without keeping state between calls.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; the
/// header is only consumed together with its payload. Nothing is reserved
/// for the declared length; the buffer grows with the bytes that arrive.
pub fn decode_frame(src: &mut BytesMut, max_payload: Option<usize>) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0] != SIGNATURE {
        return Err(ProtocolViolation::BadSignature(src[0]).into());
    }

    let raw_len = i32::from_le_bytes([src[1], src[2], src[3], src[4]]);
    let len = checked_len(raw_len, max_payload)?;

    if src.len() - HEADER_SIZE < len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

fn checked_len(raw: i32, max_payload: Option<usize>) -> std::result::Result<usize, ProtocolViolation> {
    let len = usize::try_from(raw).map_err(|_| ProtocolViolation::NegativeLength(raw))?;
    match max_payload {
        Some(max) if len > max => Err(ProtocolViolation::Oversized { len, max }),
        _ => Ok(len),
    }
}

/// One result produced by [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete payload.
    Payload(Bytes),
    /// The stream broke the protocol; no further payloads will follow.
    Failure(ProtocolViolation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingPayload(usize),
    Failed,
}

/// Incremental decoder for an append-only byte stream.
///
/// Bytes are consumed strictly in arrival order. A parsed length stays pending
/// until its payload is complete. After a protocol violation the decoder is
/// terminal: it never resynchronizes and discards everything fed to it.
///
/// Not thread-safe; exactly one reader feeds a decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: State,
    max_payload: Option<usize>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Decoder that accepts any length the wire can express.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: State::AwaitingHeader,
            max_payload: None,
        }
    }

    /// Decoder that treats lengths above `max_payload` as a protocol violation.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: Some(max_payload),
            ..Self::new()
        }
    }

    /// Append `bytes` and return the results that are now decodable.
    ///
    /// The returned iterator is lazy: anything it does not yield stays
    /// buffered and comes out of the next `feed`.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        if self.state != State::Failed {
            self.buf.extend_from_slice(bytes);
        }
        Frames { decoder: self }
    }

    /// Decode the next result from what is already buffered.
    pub fn next_decoded(&mut self) -> Option<Decoded> {
        loop {
            match self.state {
                State::Failed => return None,
                State::AwaitingHeader => {
                    if self.buf.len() < HEADER_SIZE {
                        return None;
                    }
                    let signature = self.buf.get_u8();
                    if signature != SIGNATURE {
                        return Some(self.fail(ProtocolViolation::BadSignature(signature)));
                    }
                    let raw_len = self.buf.get_i32_le();
                    match checked_len(raw_len, self.max_payload) {
                        Ok(len) => self.state = State::AwaitingPayload(len),
                        Err(violation) => return Some(self.fail(violation)),
                    }
                }
                State::AwaitingPayload(len) => {
                    if self.buf.len() < len {
                        return None;
                    }
                    let payload = self.buf.split_to(len).freeze();
                    self.state = State::AwaitingHeader;
                    return Some(Decoded::Payload(payload));
                }
            }
        }
    }

    /// Length of the payload currently being waited for, if a header was parsed.
    pub fn pending_len(&self) -> Option<usize> {
        match self.state {
            State::AwaitingPayload(len) => Some(len),
            _ => None,
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the decoder hit a protocol violation.
    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    fn fail(&mut self, violation: ProtocolViolation) -> Decoded {
        warn!(error = %violation, "frame decoder entering failed state");
        self.state = State::Failed;
        self.buf = BytesMut::new();
        Decoded::Failure(violation)
    }
}

/// Lazy sequence of results returned by [`FrameDecoder::feed`].
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Decoded;

    fn next(&mut self) -> Option<Decoded> {
        self.decoder.next_decoded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(results: impl IntoIterator<Item = Decoded>) -> Vec<Bytes> {
        results
            .into_iter()
            .map(|decoded| match decoded {
                Decoded::Payload(payload) => payload,
                Decoded::Failure(v) => panic!("unexpected failure: {v}"),
            })
            .collect()
    }

    #[test]
    fn test_encode_layout() {
        let wire = frame_bytes(b"hi").unwrap();
        assert_eq!(wire.as_ref(), &[0xCE, 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let wire = frame_bytes(br#"{"action":"tap"}"#).unwrap();

        let mut decoder = FrameDecoder::new();
        let out = payloads(decoder.feed(&wire));

        assert_eq!(out, vec![Bytes::from_static(br#"{"action":"tap"}"#)]);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.pending_len(), None);
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut wire = BytesMut::new();
        encode_frame(b"first", &mut wire).unwrap();
        encode_frame(b"second", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let out = payloads(decoder.feed(&wire));
        assert_eq!(out, vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")]);
    }

    #[test]
    fn test_zero_length_does_not_stall() {
        let mut wire = BytesMut::new();
        encode_frame(b"", &mut wire).unwrap();
        encode_frame(b"after", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let out = payloads(decoder.feed(&wire));
        assert_eq!(out, vec![Bytes::new(), Bytes::from_static(b"after")]);
    }

    #[test]
    fn test_header_waits_for_five_bytes() {
        let wire = frame_bytes(b"abc").unwrap();
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.feed(&wire[..4]).count(), 0);
        assert_eq!(decoder.pending_len(), None);

        assert_eq!(decoder.feed(&wire[4..5]).count(), 0);
        assert_eq!(decoder.pending_len(), Some(3));

        let out = payloads(decoder.feed(&wire[5..]));
        assert_eq!(out, vec![Bytes::from_static(b"abc")]);
        assert_eq!(decoder.pending_len(), None);
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let mut wire = BytesMut::new();
        encode_frame(b"one", &mut wire).unwrap();
        encode_frame(b"", &mut wire).unwrap();
        encode_frame(b"three", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for byte in wire.iter() {
            out.extend(payloads(decoder.feed(std::slice::from_ref(byte))));
        }
        assert_eq!(
            out,
            vec![
                Bytes::from_static(b"one"),
                Bytes::new(),
                Bytes::from_static(b"three")
            ]
        );
    }

    #[test]
    fn test_bad_signature_is_terminal() {
        let mut wire = BytesMut::from(&[0x7Bu8, 0, 0, 0, 0][..]);
        encode_frame(b"valid", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let results: Vec<_> = decoder.feed(&wire).collect();
        assert_eq!(
            results,
            vec![Decoded::Failure(ProtocolViolation::BadSignature(0x7B))]
        );
        assert!(decoder.is_failed());

        let later = frame_bytes(b"still valid").unwrap();
        assert_eq!(decoder.feed(&later).count(), 0);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_negative_length_is_violation() {
        let mut wire = BytesMut::new();
        wire.put_u8(SIGNATURE);
        wire.put_i32_le(-1);

        let mut decoder = FrameDecoder::new();
        let results: Vec<_> = decoder.feed(&wire).collect();
        assert_eq!(
            results,
            vec![Decoded::Failure(ProtocolViolation::NegativeLength(-1))]
        );
    }

    #[test]
    fn test_max_payload_enforced() {
        let wire = frame_bytes(&[0u8; 64]).unwrap();
        let mut decoder = FrameDecoder::with_max_payload(16);
        let results: Vec<_> = decoder.feed(&wire).collect();
        assert_eq!(
            results,
            vec![Decoded::Failure(ProtocolViolation::Oversized { len: 64, max: 16 })]
        );
    }

    #[test]
    fn test_lazy_iterator_keeps_unread_frames() {
        let mut wire = BytesMut::new();
        encode_frame(b"a", &mut wire).unwrap();
        encode_frame(b"b", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let first = decoder.feed(&wire).next();
        assert_eq!(first, Some(Decoded::Payload(Bytes::from_static(b"a"))));

        let rest = payloads(decoder.feed(&[]));
        assert_eq!(rest, vec![Bytes::from_static(b"b")]);
    }

    #[test]
    fn test_stateless_decode_incomplete() {
        let wire = frame_bytes(b"hello").unwrap();
        let mut buf = BytesMut::from(&wire[..HEADER_SIZE + 2]);
        assert!(decode_frame(&mut buf, None).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);

        buf.extend_from_slice(&wire[HEADER_SIZE + 2..]);
        let payload = decode_frame(&mut buf, None).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stateless_decode_does_not_allocate_declared_length() {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u8(SIGNATURE);
        buf.put_i32_le(i32::MAX);

        assert!(decode_frame(&mut buf, None).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE);
        assert!(buf.capacity() < 64 * 1024, "capacity {}", buf.capacity());

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&buf).count(), 0);
        assert_eq!(decoder.pending_len(), Some(MAX_PAYLOAD_LEN));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_stateless_decode_errors() {
        let mut bad = BytesMut::from(&[0x00u8, 1, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_frame(&mut bad, None),
            Err(FrameError::Protocol(ProtocolViolation::BadSignature(0)))
        ));

        let mut big = BytesMut::new();
        big.put_u8(SIGNATURE);
        big.put_i32_le(1024);
        assert!(matches!(
            decode_frame(&mut big, Some(8)),
            Err(FrameError::Protocol(ProtocolViolation::Oversized { .. }))
        ));
    }
}
