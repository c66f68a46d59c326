// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Frame reader and writer over a split byte stream.
//!
//! The connection task owns both halves. [`FrameReader::read_frame`] is
//! cancel-safe: partially received bytes stay in the read buffer, so it can
//! sit in a `select!` next to the outbound queue.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uasrv_core::{EncodingError, TransportError, UaResult};

use crate::frame::{Direction, Frame, FrameHeader, HEADER_SIZE};

/// Initial read buffer capacity.
const READ_BUFFER_CAPACITY: usize = 8192;

// =============================================================================
// FrameReader
// =============================================================================

/// Reads complete frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    direction: Direction,
    max_message_size: usize,
    read_buf: BytesMut,
}

impl<R> FrameReader<R> {
    /// Creates a reader for frames sent in `direction`.
    pub fn new(inner: R, direction: Direction, max_message_size: usize) -> Self {
        Self {
            inner,
            direction,
            max_message_size,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Returns the largest frame this reader accepts.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reads the next raw frame, header included.
    pub async fn read_raw(&mut self) -> UaResult<Bytes> {
        while self.read_buf.len() < HEADER_SIZE {
            self.fill().await?;
        }

        let header = FrameHeader::decode(&self.read_buf)?;
        if header.size > self.max_message_size {
            return Err(EncodingError::MessageTooLarge {
                size: header.size,
                max: self.max_message_size,
            }
            .into());
        }

        while self.read_buf.len() < header.size {
            self.fill().await?;
        }

        Ok(self.read_buf.split_to(header.size).freeze())
    }

    /// Reads and decodes the next frame.
    pub async fn read_frame(&mut self) -> UaResult<(Frame, usize)> {
        let raw = self.read_raw().await?;
        let frame = Frame::decode(&raw, self.direction)?;
        Ok((frame, raw.len()))
    }

    async fn fill(&mut self) -> UaResult<()> {
        if self.read_buf.capacity() - self.read_buf.len() < READ_BUFFER_CAPACITY / 2 {
            self.read_buf.reserve(READ_BUFFER_CAPACITY);
        }
        let n = self
            .inner
            .read_buf(&mut self.read_buf)
            .await
            .map_err(TransportError::Io)?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed.into());
        }
        Ok(())
    }
}

// =============================================================================
// FrameWriter
// =============================================================================

/// Writes frames to a byte stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W> {
    /// Wraps the write half.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Encodes and writes a frame. Returns the bytes written.
    pub async fn write_frame(&mut self, frame: &Frame) -> UaResult<usize> {
        let bytes = frame.encode();
        self.inner
            .write_all(&bytes)
            .await
            .map_err(TransportError::Io)?;
        self.inner.flush().await.map_err(TransportError::Io)?;
        Ok(bytes.len())
    }

    /// Shuts the write side down.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            tracing::trace!(error = %e, "Shutdown of write half failed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ErrorMessage, HelloMessage};
    use tokio::io::duplex;
    use uasrv_core::{StatusCode, UaError};

    #[tokio::test]
    async fn test_frames_across_split_writes() {
        let (client, server) = duplex(64);
        let mut reader = FrameReader::new(server, Direction::FromClient, 1024);

        let writer = tokio::spawn(async move {
            let mut writer = FrameWriter::new(client);
            writer
                .write_frame(&Frame::Hello(HelloMessage::new("opc.tcp://a:4840/with/a/long/path")))
                .await
                .unwrap();
            writer
                .write_frame(&Frame::Error(ErrorMessage::new(StatusCode::BAD_TIMEOUT, "x")))
                .await
                .unwrap();
        });

        let (first, size) = reader.read_frame().await.unwrap();
        assert!(matches!(first, Frame::Hello(ref h) if h.endpoint_url.ends_with("/path")));
        assert!(size > HEADER_SIZE);
        let (second, _) = reader.read_frame().await.unwrap();
        assert!(matches!(second, Frame::Error(ref e) if e.status == StatusCode::BAD_TIMEOUT));

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (client, server) = duplex(1024);
        let mut reader = FrameReader::new(server, Direction::FromClient, 16);
        let mut writer = FrameWriter::new(client);
        writer
            .write_frame(&Frame::Hello(HelloMessage::new("opc.tcp://localhost:4840")))
            .await
            .unwrap();

        let err = reader.read_frame().await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TCP_MESSAGE_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (client, server) = duplex(64);
        let mut reader = FrameReader::new(server, Direction::FromClient, 1024);
        drop(client);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            UaError::Transport(TransportError::ConnectionClosed)
        ));
    }
}
