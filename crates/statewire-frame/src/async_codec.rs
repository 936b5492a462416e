//! `tokio_util::codec` adapter for the same wire format.
//!
//! Lets async producers and consumers use `Framed` instead of the
//! readiness-driven [`StreamReader`](crate::StreamReader) and
//! [`StreamWriter`](crate::StreamWriter).

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame};
use crate::error::FrameError;

/// Frame codec for `tokio_util::codec::Framed`.
#[derive(Debug, Clone, Default)]
pub struct DebugCodec {
    max_payload: Option<usize>,
}

impl DebugCodec {
    /// Codec without a payload limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that rejects frames longer than `max_payload`.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: Some(max_payload),
        }
    }
}

impl Decoder for DebugCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        decode_frame(src, self.max_payload)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decode(src)? {
            Some(payload) => Ok(Some(payload)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Bytes> for DebugCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(item.as_ref(), dst)
    }
}

impl Encoder<&[u8]> for DebugCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_frame(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::frame_bytes;
    use crate::error::ProtocolViolation;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, DebugCodec::new());
        let mut reader = FramedRead::new(server, DebugCodec::new());

        let send = tokio::spawn(async move {
            writer
                .send(Bytes::from_static(br#"{"action":"tick"}"#))
                .await
                .unwrap();
            writer.send(Bytes::new()).await.unwrap();
        });

        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        send.await.unwrap();

        assert_eq!(first.as_ref(), br#"{"action":"tick"}"#);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn framed_read_reports_truncated_frame() {
        let (mut client, server) = tokio::io::duplex(64);
        let wire = frame_bytes(b"truncated").unwrap();
        client.write_all(&wire[..wire.len() - 3]).await.unwrap();
        drop(client);

        let mut reader = FramedRead::new(server, DebugCodec::new());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn framed_read_buffers_only_what_arrives() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut header = BytesMut::new();
        header.extend_from_slice(&[crate::codec::SIGNATURE]);
        header.extend_from_slice(&i32::MAX.to_le_bytes());
        client.write_all(&header).await.unwrap();
        drop(client);

        let mut reader = FramedRead::new(server, DebugCodec::new());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(reader.read_buffer().capacity() < 64 * 1024);
    }

    #[tokio::test]
    async fn framed_read_rejects_bad_signature() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0x01, 0, 0, 0, 0]).await.unwrap();

        let mut reader = FramedRead::new(server, DebugCodec::new());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Protocol(ProtocolViolation::BadSignature(0x01))
        ));
    }

    #[test]
    fn slice_encoder_matches_frame_bytes() {
        let mut codec = DebugCodec::with_max_payload(16);
        let mut dst = BytesMut::new();
        codec.encode(&b"abc"[..], &mut dst).unwrap();
        assert_eq!(dst.as_ref(), frame_bytes(b"abc").unwrap().as_ref());
    }
}
