// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection task: one per accepted socket.
//!
//! The task owns the socket halves and the [`SecureChannel`] and multiplexes
//! four inputs:
//!
//! ```text
//!  listener ──ChannelCommand──┐
//!  channel timer ─────────────┤
//!  engine ──Outbound──────────┼──► Connection ──MSG/ACK/OPN/ERR──► socket
//!  socket ──frames────────────┘        │
//!                                      └──Request──► engine
//! ```
//!
//! Handshake failures are answered with an `ERR` frame carrying
//! `BadCommunicationError` or `BadTimeout` before the socket is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::instrument;
use uasrv_core::{ChannelError, ChannelId, StatusCode, TransportError, UaError, UaResult};

use crate::channel::{ChannelLimits, ChannelState, ChannelTimerEvent, SecureChannel};
use crate::engine::EngineHandle;
use crate::events::Outbound;
use crate::frame::{Direction, ErrorMessage, Frame};
use crate::registry::{ChannelCommand, ChannelStatus};
use crate::transport::{FrameReader, FrameWriter};

/// Queue depth of the channel's own timer.
const CHANNEL_TIMER_CAPACITY: usize = 4;

/// Drives one secure channel over a byte stream.
pub struct Connection<R, W> {
    channel: SecureChannel,
    handshake_timeout: Duration,
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    engine: EngineHandle,
    control: mpsc::Receiver<ChannelCommand>,
    timers: mpsc::Receiver<ChannelTimerEvent>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    registered: bool,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a connection over the given stream halves.
    pub fn new(
        id: ChannelId,
        limits: ChannelLimits,
        status: Arc<ChannelStatus>,
        reader: R,
        writer: W,
        engine: EngineHandle,
        control: mpsc::Receiver<ChannelCommand>,
    ) -> Self {
        let (timer_tx, timers) = mpsc::channel(CHANNEL_TIMER_CAPACITY);
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        Self {
            channel: SecureChannel::new(id, limits, status, timer_tx),
            handshake_timeout: limits.handshake_timeout,
            reader: FrameReader::new(reader, Direction::FromClient, limits.max_message_size as usize),
            writer: FrameWriter::new(writer),
            engine,
            control,
            timers,
            outbound_tx,
            outbound,
            registered: false,
        }
    }

    /// Runs the channel until it closes or aborts.
    ///
    /// `Ok` covers orderly ends: a `CLO` frame, the peer hanging up, or a
    /// close command from the listener.
    #[instrument(skip(self), fields(channel_id = %self.channel.id()))]
    pub async fn run(mut self) -> UaResult<()> {
        let result = self.serve().await;
        if let Err(e) = &result {
            self.abort(e).await;
        }

        self.channel.close();
        self.writer.disconnect().await;
        if self.registered {
            self.engine.channel_closed(self.channel.id()).await;
        }
        result
    }

    async fn serve(&mut self) -> UaResult<()> {
        self.channel.start_handshake()?;

        loop {
            tokio::select! {
                biased;

                command = self.control.recv() => {
                    match command {
                        Some(ChannelCommand::Close) | None => {
                            tracing::debug!("Close requested by listener");
                            return Ok(());
                        }
                    }
                }

                Some(event) = self.timers.recv() => {
                    self.on_timer(event)?;
                }

                Some(outbound) = self.outbound.recv() => {
                    self.on_outbound(outbound).await?;
                }

                frame = self.reader.read_frame() => {
                    let (frame, size) = match frame {
                        Ok(read) => read,
                        Err(UaError::Transport(TransportError::ConnectionClosed)) => {
                            tracing::debug!("Peer closed the connection");
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    };
                    self.channel.status().record_read(size);
                    if !self.on_frame(frame).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn on_timer(&mut self, event: ChannelTimerEvent) -> UaResult<()> {
        match event {
            ChannelTimerEvent::HandshakeTimeout => {
                if self.channel.state() == ChannelState::WaitForOpen {
                    return Err(
                        ChannelError::handshake_timeout(self.channel.id().value(), self.handshake_timeout).into(),
                    );
                }
            }
            ChannelTimerEvent::TokenCheck => self.channel.check_tokens(Instant::now())?,
        }
        Ok(())
    }

    async fn on_outbound(&mut self, outbound: Outbound) -> UaResult<()> {
        match outbound {
            Outbound::Response {
                request_id,
                payload,
            } => {
                let message = self.channel.response_message(request_id, payload)?;
                self.write(&Frame::Message(message)).await?;
            }
            Outbound::AttachSession(session_id) => self.channel.attach_session(session_id),
            Outbound::DetachSession(session_id) => self.channel.detach_session(session_id),
        }
        Ok(())
    }

    /// Handles one inbound frame. Returns `false` once the channel is done.
    async fn on_frame(&mut self, frame: Frame) -> UaResult<bool> {
        let id = self.channel.id();
        match frame {
            Frame::Hello(hello) => {
                let ack = self.channel.on_hello(&hello)?;
                self.write(&Frame::Acknowledge(ack)).await?;
            }
            Frame::OpenRequest(open) => {
                let response = self.channel.open(&open)?;
                self.write(&Frame::OpenResponse(response)).await?;
                if !self.registered {
                    self.engine
                        .channel_opened(id, self.outbound_tx.clone())
                        .await?;
                    self.registered = true;
                }
            }
            Frame::Message(message) => {
                self.channel.validate_message(&message, Instant::now())?;
                self.channel.receive_request(message.request_id);
                self.engine
                    .request(id, message.request_id, message.payload)
                    .await?;
            }
            Frame::Close(message) => {
                self.channel.validate_message(&message, Instant::now())?;
                self.channel.begin_close();
                tracing::info!("Secure channel closed by client");
                return Ok(false);
            }
            other => {
                return Err(ChannelError::unexpected_message(id.value(), other.message_type().as_str()).into());
            }
        }
        Ok(true)
    }

    async fn write(&mut self, frame: &Frame) -> UaResult<()> {
        let written = self.writer.write_frame(frame).await?;
        self.channel.status().record_written(written);
        Ok(())
    }

    /// Reports the failure to the peer where the stream still allows it.
    async fn abort(&mut self, error: &UaError) {
        if matches!(error, UaError::Transport(_)) {
            tracing::debug!(error = %error, "Transport failed");
            return;
        }

        let status = match self.channel.state() {
            ChannelState::Init | ChannelState::WaitForOpen => {
                if error.status_code() == StatusCode::BAD_TIMEOUT {
                    StatusCode::BAD_TIMEOUT
                } else {
                    StatusCode::BAD_COMMUNICATION_ERROR
                }
            }
            _ => error.status_code(),
        };
        tracing::warn!(state = %self.channel.state(), status = %status, error = %error, "Secure channel aborted");

        let frame = Frame::Error(ErrorMessage::new(status, error.to_string()));
        if let Err(e) = self.write(&frame).await {
            tracing::trace!(error = %e, "Could not send ERR frame");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
