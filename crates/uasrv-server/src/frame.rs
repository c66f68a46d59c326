// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Chunk framing for the OPC UA TCP transport.
//!
//! Every frame is a single final chunk:
//!
//! ```text
//! ┌──────────────┬───────┬────────────────┬──────────────────────────┐
//! │ type (3 B)   │ 'F'   │ size (u32 LE)  │ body (size - 8 bytes)    │
//! │ HEL ACK OPN  │       │ incl. header   │                          │
//! │ MSG CLO ERR  │       │                │                          │
//! └──────────────┴───────┴────────────────┴──────────────────────────┘
//! ```
//!
//! Integers are little-endian. Strings are an `i32` byte length followed by
//! UTF-8 bytes, with `-1` encoding a null string. `OPN` bodies differ by
//! direction, so decoding takes a [`Direction`].

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use uasrv_core::{
    ChannelError, ChannelId, EncodingError, MessageSecurityMode, RequestId, StatusCode, TokenId,
    UaResult,
};

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 8;

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: u32 = 0;

/// Chunk type byte of a final chunk.
pub const FINAL_CHUNK: u8 = b'F';

// =============================================================================
// MessageType
// =============================================================================

/// Transport message type carried in the first three header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client hello.
    Hello,
    /// Server acknowledge.
    Acknowledge,
    /// OpenSecureChannel request or response.
    OpenSecureChannel,
    /// Service message.
    Message,
    /// CloseSecureChannel request.
    CloseSecureChannel,
    /// Transport error.
    Error,
}

impl MessageType {
    /// Returns the three-byte wire code.
    pub const fn code(&self) -> &'static [u8; 3] {
        match self {
            Self::Hello => b"HEL",
            Self::Acknowledge => b"ACK",
            Self::OpenSecureChannel => b"OPN",
            Self::Message => b"MSG",
            Self::CloseSecureChannel => b"CLO",
            Self::Error => b"ERR",
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: &[u8]) -> Result<Self, EncodingError> {
        match code {
            b"HEL" => Ok(Self::Hello),
            b"ACK" => Ok(Self::Acknowledge),
            b"OPN" => Ok(Self::OpenSecureChannel),
            b"MSG" => Ok(Self::Message),
            b"CLO" => Ok(Self::CloseSecureChannel),
            b"ERR" => Ok(Self::Error),
            other => Err(EncodingError::InvalidMessageType {
                message_type: String::from_utf8_lossy(other).into_owned(),
            }),
        }
    }

    /// Returns the code as text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "HEL",
            Self::Acknowledge => "ACK",
            Self::OpenSecureChannel => "OPN",
            Self::Message => "MSG",
            Self::CloseSecureChannel => "CLO",
            Self::Error => "ERR",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side produced a frame. Only `OPN` bodies depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Frames read by the server.
    FromClient,
    /// Frames read by a client.
    FromServer,
}

// =============================================================================
// FrameHeader
// =============================================================================

/// The fixed eight-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type.
    pub message_type: MessageType,
    /// Total frame size including the header.
    pub size: usize,
}

impl FrameHeader {
    /// Decodes a header from the first eight bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, EncodingError> {
        if buf.len() < HEADER_SIZE {
            return Err(EncodingError::truncated(HEADER_SIZE, buf.len()));
        }
        let message_type = MessageType::from_code(&buf[0..3])?;
        if buf[3] != FINAL_CHUNK {
            return Err(EncodingError::InvalidChunkType { chunk_type: buf[3] });
        }
        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if size < HEADER_SIZE {
            return Err(EncodingError::truncated(HEADER_SIZE, size));
        }
        Ok(Self { message_type, size })
    }
}

// =============================================================================
// Bodies
// =============================================================================

/// Client hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    /// Client protocol version.
    pub protocol_version: u32,
    /// Largest chunk the client can receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the client will send.
    pub send_buffer_size: u32,
    /// Largest message the client accepts (0 = no limit).
    pub max_message_size: u32,
    /// Most chunks per message (0 = no limit).
    pub max_chunk_count: u32,
    /// Endpoint the client connects to.
    pub endpoint_url: String,
}

impl HelloMessage {
    /// Creates a hello with permissive limits.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: 65_535,
            send_buffer_size: 65_535,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: endpoint_url.into(),
        }
    }
}

/// Server acknowledge with revised limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeMessage {
    /// Server protocol version.
    pub protocol_version: u32,
    /// Revised receive buffer size.
    pub receive_buffer_size: u32,
    /// Revised send buffer size.
    pub send_buffer_size: u32,
    /// Largest message the server accepts.
    pub max_message_size: u32,
    /// Most chunks per message.
    pub max_chunk_count: u32,
}

/// OpenSecureChannel request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTokenRequestType {
    /// First token of a channel.
    Issue,
    /// Replacement token on an open channel.
    Renew,
}

impl SecurityTokenRequestType {
    /// Returns the wire value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Issue => 0,
            Self::Renew => 1,
        }
    }
}

impl fmt::Display for SecurityTokenRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => f.write_str("issue"),
            Self::Renew => f.write_str("renew"),
        }
    }
}

/// OpenSecureChannel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Channel id (0 on issue).
    pub channel_id: ChannelId,
    /// Sender sequence number.
    pub sequence_number: u32,
    /// Request id echoed in the response.
    pub request_id: RequestId,
    /// Issue or renew.
    pub request_type: SecurityTokenRequestType,
    /// Requested message security mode.
    pub security_mode: MessageSecurityMode,
    /// Requested token lifetime in milliseconds (0 = server default).
    pub requested_lifetime: u32,
}

/// Security token handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSecurityToken {
    /// Owning channel.
    pub channel_id: ChannelId,
    /// Token id, strictly increasing per channel.
    pub token_id: TokenId,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// Revised lifetime in milliseconds.
    pub revised_lifetime: u32,
}

/// OpenSecureChannel response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResponse {
    /// Channel id assigned by the server.
    pub channel_id: ChannelId,
    /// Server sequence number.
    pub sequence_number: u32,
    /// Request id of the originating request.
    pub request_id: RequestId,
    /// The issued token.
    pub token: ChannelSecurityToken,
}

/// Header and payload shared by `MSG` and `CLO` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMessage {
    /// Channel id.
    pub channel_id: ChannelId,
    /// Security token in use.
    pub token_id: TokenId,
    /// Sender sequence number.
    pub sequence_number: u32,
    /// Request id correlating request and response.
    pub request_id: RequestId,
    /// Opaque service payload.
    pub payload: Bytes,
}

/// Transport error sent before the server drops a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Reason code.
    pub status: StatusCode,
    /// Human-readable reason.
    pub reason: String,
}

impl ErrorMessage {
    /// Creates an error message.
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

/// A decoded transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `HEL`.
    Hello(HelloMessage),
    /// `ACK`.
    Acknowledge(AcknowledgeMessage),
    /// `OPN` from a client.
    OpenRequest(OpenRequest),
    /// `OPN` from the server.
    OpenResponse(OpenResponse),
    /// `MSG`.
    Message(ServiceMessage),
    /// `CLO`.
    Close(ServiceMessage),
    /// `ERR`.
    Error(ErrorMessage),
}

impl Frame {
    /// Returns the frame's message type.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::Acknowledge(_) => MessageType::Acknowledge,
            Self::OpenRequest(_) | Self::OpenResponse(_) => MessageType::OpenSecureChannel,
            Self::Message(_) => MessageType::Message,
            Self::Close(_) => MessageType::CloseSecureChannel,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Encodes the frame including its header.
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(64);
        match self {
            Self::Hello(hello) => {
                body.put_u32_le(hello.protocol_version);
                body.put_u32_le(hello.receive_buffer_size);
                body.put_u32_le(hello.send_buffer_size);
                body.put_u32_le(hello.max_message_size);
                body.put_u32_le(hello.max_chunk_count);
                put_string(&mut body, Some(&hello.endpoint_url));
            }
            Self::Acknowledge(ack) => {
                body.put_u32_le(ack.protocol_version);
                body.put_u32_le(ack.receive_buffer_size);
                body.put_u32_le(ack.send_buffer_size);
                body.put_u32_le(ack.max_message_size);
                body.put_u32_le(ack.max_chunk_count);
            }
            Self::OpenRequest(open) => {
                body.put_u32_le(open.channel_id.value());
                body.put_u32_le(open.sequence_number);
                body.put_u32_le(open.request_id.value());
                body.put_u32_le(open.request_type.value());
                body.put_u32_le(open.security_mode.value());
                body.put_u32_le(open.requested_lifetime);
            }
            Self::OpenResponse(open) => {
                body.put_u32_le(open.channel_id.value());
                body.put_u32_le(open.sequence_number);
                body.put_u32_le(open.request_id.value());
                body.put_u32_le(open.token.channel_id.value());
                body.put_u32_le(open.token.token_id.value());
                body.put_i64_le(open.token.created_at.timestamp_millis());
                body.put_u32_le(open.token.revised_lifetime);
            }
            Self::Message(msg) | Self::Close(msg) => {
                body.put_u32_le(msg.channel_id.value());
                body.put_u32_le(msg.token_id.value());
                body.put_u32_le(msg.sequence_number);
                body.put_u32_le(msg.request_id.value());
                body.put_slice(&msg.payload);
            }
            Self::Error(err) => {
                body.put_u32_le(err.status.value());
                put_string(&mut body, Some(&err.reason));
            }
        }

        let mut frame = BytesMut::with_capacity(HEADER_SIZE + body.len());
        frame.put_slice(self.message_type().code());
        frame.put_u8(FINAL_CHUNK);
        frame.put_u32_le((HEADER_SIZE + body.len()) as u32);
        frame.put_slice(&body);
        frame.freeze()
    }

    /// Decodes a complete frame (header and body).
    pub fn decode(frame: &[u8], direction: Direction) -> UaResult<Self> {
        let header = FrameHeader::decode(frame)?;
        if frame.len() < header.size {
            return Err(EncodingError::truncated(header.size, frame.len()).into());
        }
        let mut body = Reader::new(&frame[HEADER_SIZE..header.size]);

        let decoded = match header.message_type {
            MessageType::Hello => Self::Hello(HelloMessage {
                protocol_version: body.u32()?,
                receive_buffer_size: body.u32()?,
                send_buffer_size: body.u32()?,
                max_message_size: body.u32()?,
                max_chunk_count: body.u32()?,
                endpoint_url: body.string()?.unwrap_or_default(),
            }),
            MessageType::Acknowledge => Self::Acknowledge(AcknowledgeMessage {
                protocol_version: body.u32()?,
                receive_buffer_size: body.u32()?,
                send_buffer_size: body.u32()?,
                max_message_size: body.u32()?,
                max_chunk_count: body.u32()?,
            }),
            MessageType::OpenSecureChannel if direction == Direction::FromClient => {
                let channel_id = ChannelId::new(body.u32()?);
                let sequence_number = body.u32()?;
                let request_id = RequestId::new(body.u32()?);
                let request_type = match body.u32()? {
                    0 => SecurityTokenRequestType::Issue,
                    1 => SecurityTokenRequestType::Renew,
                    other => {
                        return Err(ChannelError::InvalidRequestType {
                            channel_id: channel_id.value(),
                            request_type: other,
                        }
                        .into());
                    }
                };
                let mode = body.u32()?;
                let security_mode = MessageSecurityMode::from_value(mode).ok_or_else(|| {
                    ChannelError::SecurityModeRejected {
                        mode: mode.to_string(),
                    }
                })?;
                Self::OpenRequest(OpenRequest {
                    channel_id,
                    sequence_number,
                    request_id,
                    request_type,
                    security_mode,
                    requested_lifetime: body.u32()?,
                })
            }
            MessageType::OpenSecureChannel => {
                let channel_id = ChannelId::new(body.u32()?);
                let sequence_number = body.u32()?;
                let request_id = RequestId::new(body.u32()?);
                let token_channel = ChannelId::new(body.u32()?);
                let token_id = TokenId::new(body.u32()?);
                let created_ms = body.i64()?;
                let created_at = Utc
                    .timestamp_millis_opt(created_ms)
                    .single()
                    .ok_or_else(|| EncodingError::decode("token timestamp out of range"))?;
                Self::OpenResponse(OpenResponse {
                    channel_id,
                    sequence_number,
                    request_id,
                    token: ChannelSecurityToken {
                        channel_id: token_channel,
                        token_id,
                        created_at,
                        revised_lifetime: body.u32()?,
                    },
                })
            }
            MessageType::Message | MessageType::CloseSecureChannel => {
                let msg = ServiceMessage {
                    channel_id: ChannelId::new(body.u32()?),
                    token_id: TokenId::new(body.u32()?),
                    sequence_number: body.u32()?,
                    request_id: RequestId::new(body.u32()?),
                    payload: Bytes::copy_from_slice(body.rest()),
                };
                if header.message_type == MessageType::Message {
                    Self::Message(msg)
                } else {
                    Self::Close(msg)
                }
            }
            MessageType::Error => Self::Error(ErrorMessage {
                status: StatusCode::new(body.u32()?),
                reason: body.string()?.unwrap_or_default(),
            }),
        };

        Ok(decoded)
    }
}

// =============================================================================
// Primitive codec
// =============================================================================

fn put_string(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(s) => {
            buf.put_i32_le(s.len() as i32);
            buf.put_slice(s.as_bytes());
        }
        None => buf.put_i32_le(-1),
    }
}

/// Bounds-checked little-endian reader.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EncodingError> {
        if self.buf.len() < n {
            return Err(EncodingError::truncated(n, self.buf.len()));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32, EncodingError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, EncodingError> {
        Ok(self.u32()? as i32)
    }

    fn i64(&mut self) -> Result<i64, EncodingError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<Option<String>, EncodingError> {
        let len = self.i32()?;
        if len < 0 {
            return Ok(None);
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| EncodingError::InvalidString {
                message: e.to_string(),
            })
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame, direction: Direction) -> Frame {
        Frame::decode(&frame.encode(), direction).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let frame = Frame::Error(ErrorMessage::new(StatusCode::BAD_TIMEOUT, "late"));
        let bytes = frame.encode();

        assert_eq!(&bytes[0..3], b"ERR");
        assert_eq!(bytes[3], b'F');
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        assert_eq!(size, bytes.len());
        assert_eq!(size, HEADER_SIZE + 4 + 4 + 4);
    }

    #[test]
    fn test_open_body_depends_on_direction() {
        let request = Frame::OpenRequest(OpenRequest {
            channel_id: ChannelId::new(0),
            sequence_number: 1,
            request_id: RequestId::new(1),
            request_type: SecurityTokenRequestType::Issue,
            security_mode: MessageSecurityMode::None,
            requested_lifetime: 60_000,
        });
        assert_eq!(roundtrip(request.clone(), Direction::FromClient), request);

        let created_at = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let response = Frame::OpenResponse(OpenResponse {
            channel_id: ChannelId::new(7),
            sequence_number: 1,
            request_id: RequestId::new(1),
            token: ChannelSecurityToken {
                channel_id: ChannelId::new(7),
                token_id: TokenId::new(1),
                created_at,
                revised_lifetime: 60_000,
            },
        });
        assert_eq!(roundtrip(response.clone(), Direction::FromServer), response);
    }

    #[test]
    fn test_message_payload_is_rest_of_body() {
        let msg = Frame::Message(ServiceMessage {
            channel_id: ChannelId::new(3),
            token_id: TokenId::new(2),
            sequence_number: 10,
            request_id: RequestId::new(5),
            payload: Bytes::from_static(b"{\"x\":1}"),
        });
        match roundtrip(msg, Direction::FromClient) {
            Frame::Message(decoded) => {
                assert_eq!(decoded.request_id, RequestId::new(5));
                assert_eq!(&decoded.payload[..], b"{\"x\":1}");
            }
            other => panic!("expected MSG, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_message_type() {
        let mut bytes = Frame::Error(ErrorMessage::new(StatusCode::GOOD, "")).encode().to_vec();
        bytes[0..3].copy_from_slice(b"XYZ");
        let err = Frame::decode(&bytes, Direction::FromClient).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID);
    }

    #[test]
    fn test_invalid_chunk_type() {
        let mut bytes = Frame::Error(ErrorMessage::new(StatusCode::GOOD, "")).encode().to_vec();
        bytes[3] = b'C';
        assert!(matches!(
            FrameHeader::decode(&bytes),
            Err(EncodingError::InvalidChunkType { chunk_type: b'C' })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = Frame::Hello(HelloMessage::new("opc.tcp://localhost:4840")).encode();
        let mut cut = bytes[..HEADER_SIZE + 6].to_vec();
        let size = cut.len() as u32;
        cut[4..8].copy_from_slice(&size.to_le_bytes());
        let err = Frame::decode(&cut, Direction::FromClient).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_DECODING_ERROR);
    }

    #[test]
    fn test_bad_request_type_rejected() {
        let mut bytes = Frame::OpenRequest(OpenRequest {
            channel_id: ChannelId::new(0),
            sequence_number: 1,
            request_id: RequestId::new(1),
            request_type: SecurityTokenRequestType::Issue,
            security_mode: MessageSecurityMode::None,
            requested_lifetime: 0,
        })
        .encode()
        .to_vec();
        bytes[HEADER_SIZE + 12..HEADER_SIZE + 16].copy_from_slice(&9u32.to_le_bytes());
        let err = Frame::decode(&bytes, Direction::FromClient).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST_TYPE_INVALID);
    }
}
