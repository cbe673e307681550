// Copyright (c) 2026 Site Guardian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Authenticator Frame Codec
//!
//! Both directions of the authenticator channel carry the same framing: a
//! 4-byte little-endian length followed by exactly that many bytes of UTF-8
//! JSON. Framing is delegated to `tokio_util`'s length-delimited codec; this
//! module adds the JSON layer on top.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};

use crate::domain::error::GatewayError;

pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Length-delimited framing where only inbound frames are capped.
///
/// The peer chooses what it sends us, so reads are bounded by the configured
/// limit. Our own answers are bounded only by what the 4-byte prefix can express.
pub struct FrameCodec {
    inbound: LengthDelimitedCodec,
    outbound: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new(max_inbound_length: usize) -> Self {
        Self {
            inbound: length_delimited(max_inbound_length),
            outbound: length_delimited(u32::MAX as usize),
        }
    }
}

fn length_delimited(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_PREFIX_BYTES)
        .little_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        self.inbound.decode(src)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        self.outbound.encode(frame, dst)
    }
}

pub fn framed<S>(stream: S, max_inbound_length: usize) -> Framed<S, FrameCodec>
where
    S: AsyncRead + AsyncWrite,
{
    Framed::new(stream, FrameCodec::new(max_inbound_length))
}

pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes, GatewayError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| GatewayError::Protocol(format!("cannot encode frame: {e}")))
}

pub fn decode_message<T: DeserializeOwned>(frame: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(frame)
        .map_err(|e| GatewayError::Protocol(format!("cannot decode frame: {e}")))
}

/// Encode `message` and write it as one frame.
pub async fn send_message<S, T>(
    channel: &mut Framed<S, FrameCodec>,
    message: &T,
) -> Result<(), GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_message(message)?;
    channel
        .send(frame)
        .await
        .map_err(|e| GatewayError::AuthConnectivity(format!("cannot write frame: {e}")))
}

/// Read one frame and decode it. `None` means the peer closed the channel cleanly.
pub async fn recv_message<S, T>(
    channel: &mut Framed<S, FrameCodec>,
) -> Option<Result<T, GatewayError>>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: DeserializeOwned,
{
    let frame = channel.next().await?;
    Some(match frame {
        Ok(bytes) => decode_message(&bytes),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            Err(GatewayError::Protocol(format!("bad frame: {e}")))
        }
        Err(e) => Err(GatewayError::AuthConnectivity(format!("cannot read frame: {e}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::{AuthRequest, AuthResponse};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_frame_layout_is_little_endian_length_prefix() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let mut channel = framed(client, 1024);

        let request = AuthRequest::authenticate("a.com", "r");
        send_message(&mut channel, &request).await.unwrap();

        let body = serde_json::to_vec(&request).unwrap();
        let mut prefix = [0u8; 4];
        peer.read_exact(&mut prefix).await.unwrap();
        assert_eq!(u32::from_le_bytes(prefix) as usize, body.len());

        let mut received = vec![0u8; body.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, body);
    }

    #[tokio::test]
    async fn test_reads_hand_written_frame() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let mut channel = framed(client, 1024);

        let body = br#"{"success":true,"error":null,"domain":"a.com","timestamp":1.5}"#;
        peer.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
        peer.write_all(body).await.unwrap();

        let response: AuthResponse = recv_message(&mut channel).await.unwrap().unwrap();
        assert!(response.success);
        assert_eq!(response.domain, "a.com");
        assert_eq!(response.timestamp, 1.5);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_protocol_error() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let mut channel = framed(client, 64);

        peer.write_all(&1000u32.to_le_bytes()).await.unwrap();

        let result: Result<AuthResponse, _> = recv_message(&mut channel).await.unwrap();
        assert!(matches!(result, Err(GatewayError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_clean_close_is_none_and_bad_json_is_protocol_error() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let mut channel = framed(client, 1024);

        peer.write_all(&3u32.to_le_bytes()).await.unwrap();
        peer.write_all(b"{no").await.unwrap();
        drop(peer);

        let bad: Result<AuthResponse, _> = recv_message(&mut channel).await.unwrap();
        assert!(matches!(bad, Err(GatewayError::Protocol(_))));
        assert!(recv_message::<_, AuthResponse>(&mut channel).await.is_none());
    }

    #[tokio::test]
    async fn test_outbound_frames_are_not_capped_by_inbound_limit() {
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut channel = framed(client, 64);

        let response = AuthResponse::denied("a-rather-long-domain-name.example.com", "x".repeat(200));
        send_message(&mut channel, &response).await.unwrap();

        let mut prefix = [0u8; 4];
        peer.read_exact(&mut prefix).await.unwrap();
        assert!(u32::from_le_bytes(prefix) as usize > 64);
    }
}
