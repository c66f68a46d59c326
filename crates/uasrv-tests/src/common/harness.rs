// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! [`TestServer`] runs a real server on an ephemeral loopback port and
//! records its lifecycle events. [`TestClient`] speaks the frame protocol
//! over TCP: HEL/ACK, OPN issue and renew, JSON service payloads in MSG
//! frames, CLO.
//!
//! ```text
//!  TestClient ──TCP──► ConnectionListener ──► Connection ──► Engine
//!      ▲                                                       │
//!      └──────────────── MSG (ResponseEnvelope) ◄──────────────┘
//! ```
//!
//! Responses are matched by request id. Publish responses may overtake
//! other responses, so unmatched ones are stashed until asked for.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use uasrv_config::ServerConfig;
use uasrv_core::{
    AuthenticationToken, ChannelId, EventCollector, MessageSecurityMode, RequestId, StatusCode,
    SubscriptionId, TokenId, TransportError, UaError,
};
use uasrv_server::frame::{
    AcknowledgeMessage, HelloMessage, OpenRequest, OpenResponse, SecurityTokenRequestType,
    ServiceMessage,
};
use uasrv_server::service::{
    ActivateSessionRequest, CloseSessionRequest, CreateSessionRequest, CreateSubscriptionResponse,
    PublishResponse,
};
use uasrv_server::{
    AddressSpace, Direction, ErrorMessage, Frame, FrameReader, FrameWriter, JsonServiceCodec,
    RequestEnvelope, ResponseEnvelope, ServerEvent, ServerHandle, ServiceCodec, ServiceRequest,
    ServiceResponse, UaServer,
};

use super::builders::{SubscriptionBuilder, publish};
use super::fixtures::populated_space;
use super::init_test_logging;

/// Default wait for any single server reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint URL sent in HEL.
pub const TEST_ENDPOINT: &str = "opc.tcp://127.0.0.1/uasrv-tests";

const RECEIVE_BUFFER: usize = 1024 * 1024;

// =============================================================================
// TestServer
// =============================================================================

/// A running server plus an event recorder.
pub struct TestServer {
    handle: ServerHandle,
    events: Arc<EventCollector<ServerEvent>>,
}

impl TestServer {
    /// Starts a server over [`populated_space`].
    pub async fn start(config: ServerConfig) -> Self {
        Self::start_with_space(config, populated_space()).await
    }

    /// Starts a server over the given address space.
    pub async fn start_with_space(config: ServerConfig, space: Arc<dyn AddressSpace>) -> Self {
        init_test_logging();

        let server = UaServer::new(config).with_address_space(space);
        let events = Arc::new(EventCollector::new(1024));
        server.observers().register(events.clone());

        let handle = server.start().await.expect("Failed to start test server");
        Self { handle, events }
    }

    /// Returns the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// Returns the server handle.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Returns every event recorded so far.
    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.events()
    }

    /// Connects a client without sending anything.
    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr())
            .await
            .expect("Failed to connect test client")
    }

    /// Connects a client and opens a secure channel.
    pub async fn open_client(&self) -> TestClient {
        let mut client = self.client().await;
        client
            .open_channel()
            .await
            .expect("Failed to open secure channel");
        client
    }

    /// Waits until the server holds exactly `count` channels.
    pub async fn wait_for_channels(&self, count: usize) {
        let reached = wait_until(REPLY_TIMEOUT, || self.handle.channel_count() == count).await;
        assert!(
            reached,
            "Server never reached {count} channels (has {})",
            self.handle.channel_count()
        );
    }

    /// Waits until an event matching `predicate` was recorded.
    pub async fn wait_for_event(&self, predicate: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        let mut found = None;
        let reached = wait_until(REPLY_TIMEOUT, || {
            found = self.events.events().into_iter().find(|e| predicate(e));
            found.is_some()
        })
        .await;
        assert!(reached, "Expected event never arrived: {:?}", self.events());
        found.expect("event present after wait")
    }

    /// Shuts the server down.
    pub async fn stop(self) {
        self.handle.shutdown().await.expect("Server shutdown failed");
    }
}

/// Polls `condition` every 5 ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// TestClient
// =============================================================================

/// Minimal frame-level client.
pub struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    codec: JsonServiceCodec,
    channel_id: ChannelId,
    token_id: TokenId,
    sequence_number: u32,
    next_request_id: u32,
    authentication_token: AuthenticationToken,
    stash: VecDeque<(RequestId, ResponseEnvelope)>,
}

impl TestClient {
    /// Connects to `addr`.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {addr}"))?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();

        Ok(Self {
            reader: FrameReader::new(read, Direction::FromServer, RECEIVE_BUFFER),
            writer: FrameWriter::new(write),
            codec: JsonServiceCodec::new(),
            channel_id: ChannelId::new(0),
            token_id: TokenId::new(0),
            sequence_number: 0,
            next_request_id: 0,
            authentication_token: AuthenticationToken::default(),
            stash: VecDeque::new(),
        })
    }

    /// Channel id assigned by the server, 0 before OPN.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Token id used for outgoing MSG frames.
    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// Overrides the token id used for outgoing MSG frames.
    pub fn use_token(&mut self, token_id: TokenId) {
        self.token_id = token_id;
    }

    /// Session token attached to requests.
    pub fn authentication_token(&self) -> &AuthenticationToken {
        &self.authentication_token
    }

    /// Replaces the session token attached to requests.
    pub fn set_authentication_token(&mut self, token: AuthenticationToken) {
        self.authentication_token = token;
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence_number += 1;
        self.sequence_number
    }

    fn next_request(&mut self) -> RequestId {
        self.next_request_id += 1;
        RequestId::new(self.next_request_id)
    }

    // -------------------------------------------------------------------------
    // Frames
    // -------------------------------------------------------------------------

    /// Writes one frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.writer
            .write_frame(frame)
            .await
            .with_context(|| format!("write {}", frame.message_type()))?;
        Ok(())
    }

    /// Reads one frame within [`REPLY_TIMEOUT`].
    pub async fn read_frame(&mut self) -> anyhow::Result<Frame> {
        let (frame, _) = tokio::time::timeout(REPLY_TIMEOUT, self.reader.read_frame())
            .await
            .context("timed out waiting for a frame")??;
        Ok(frame)
    }

    /// Sends HEL and waits for ACK.
    pub async fn hello(&mut self) -> anyhow::Result<AcknowledgeMessage> {
        self.send_frame(&Frame::Hello(HelloMessage::new(TEST_ENDPOINT)))
            .await?;
        match self.read_frame().await? {
            Frame::Acknowledge(ack) => Ok(ack),
            Frame::Error(err) => Err(error_frame(err)),
            other => bail!("expected ACK, got {other:?}"),
        }
    }

    /// Sends an OPN request and waits for the response.
    pub async fn open_secure_channel(
        &mut self,
        request_type: SecurityTokenRequestType,
        requested_lifetime: u32,
    ) -> anyhow::Result<OpenResponse> {
        let sequence_number = self.next_sequence();
        let request_id = self.next_request();
        self.send_frame(&Frame::OpenRequest(OpenRequest {
            channel_id: self.channel_id,
            sequence_number,
            request_id,
            request_type,
            security_mode: MessageSecurityMode::None,
            requested_lifetime,
        }))
        .await?;

        loop {
            match self.read_frame().await? {
                Frame::OpenResponse(response) => {
                    if response.request_id != request_id {
                        bail!("OPN answered request {} instead of {request_id}", response.request_id);
                    }
                    self.channel_id = response.channel_id;
                    self.token_id = response.token.token_id;
                    return Ok(response);
                }
                // Publish responses may still be in flight during a renew.
                Frame::Message(message) => self.stash_message(message)?,
                Frame::Error(err) => return Err(error_frame(err)),
                other => bail!("expected OPN, got {other:?}"),
            }
        }
    }

    /// HEL/ACK followed by an OPN issue with the default lifetime.
    pub async fn open_channel(&mut self) -> anyhow::Result<OpenResponse> {
        self.hello().await?;
        self.open_secure_channel(SecurityTokenRequestType::Issue, 0)
            .await
    }

    /// Renews the security token.
    pub async fn renew(&mut self, requested_lifetime: u32) -> anyhow::Result<OpenResponse> {
        self.open_secure_channel(SecurityTokenRequestType::Renew, requested_lifetime)
            .await
    }

    /// Sends a MSG frame with a raw payload.
    pub async fn send_payload(&mut self, payload: Bytes) -> anyhow::Result<RequestId> {
        let sequence_number = self.next_sequence();
        let request_id = self.next_request();
        let frame = Frame::Message(ServiceMessage {
            channel_id: self.channel_id,
            token_id: self.token_id,
            sequence_number,
            request_id,
            payload,
        });
        self.send_frame(&frame).await?;
        Ok(request_id)
    }

    /// Sends CLO. The server drops the socket without a reply.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        let sequence_number = self.next_sequence();
        let request_id = self.next_request();
        let frame = Frame::Close(ServiceMessage {
            channel_id: self.channel_id,
            token_id: self.token_id,
            sequence_number,
            request_id,
            payload: Bytes::new(),
        });
        self.send_frame(&frame).await
    }

    /// Reads until an ERR frame arrives.
    pub async fn expect_error(&mut self) -> anyhow::Result<ErrorMessage> {
        loop {
            match self.read_frame().await? {
                Frame::Error(err) => return Ok(err),
                Frame::Message(message) => self.stash_message(message)?,
                other => bail!("expected ERR, got {other:?}"),
            }
        }
    }

    /// Reads until the server closes the socket. ERR frames are skipped.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            let read = tokio::time::timeout(REPLY_TIMEOUT, self.reader.read_frame())
                .await
                .context("timed out waiting for the server to close")?;
            match read {
                Err(UaError::Transport(TransportError::ConnectionClosed))
                | Err(UaError::Transport(TransportError::Io(_))) => return Ok(()),
                Err(other) => return Err(other.into()),
                Ok((Frame::Error(_), _)) => continue,
                Ok((Frame::Message(message), _)) => self.stash_message(message)?,
                Ok((other, _)) => bail!("expected close, got {other:?}"),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Services
    // -------------------------------------------------------------------------

    /// Sends a service request without waiting for its response.
    pub async fn send(&mut self, body: ServiceRequest) -> anyhow::Result<RequestId> {
        let handle = self.next_request_id + 1;
        let envelope = RequestEnvelope::new(self.authentication_token.clone(), handle, body);
        let payload = self.codec.encode_request(&envelope)?;
        self.send_payload(payload).await
    }

    /// Returns the next response, stashed ones first.
    pub async fn receive(&mut self) -> anyhow::Result<(RequestId, ResponseEnvelope)> {
        if let Some(stashed) = self.stash.pop_front() {
            return Ok(stashed);
        }
        loop {
            match self.read_frame().await? {
                Frame::Message(message) => {
                    let response = self.codec.decode_response(&message.payload)?;
                    return Ok((message.request_id, response));
                }
                Frame::Error(err) => return Err(error_frame(err)),
                other => bail!("expected MSG, got {other:?}"),
            }
        }
    }

    /// Waits for the response to `request_id`, stashing others.
    pub async fn receive_for(&mut self, request_id: RequestId) -> anyhow::Result<ResponseEnvelope> {
        if let Some(index) = self.stash.iter().position(|(id, _)| *id == request_id) {
            if let Some((_, response)) = self.stash.remove(index) {
                return Ok(response);
            }
        }
        loop {
            match self.read_frame().await? {
                Frame::Message(message) if message.request_id == request_id => {
                    return Ok(self.codec.decode_response(&message.payload)?);
                }
                Frame::Message(message) => self.stash_message(message)?,
                Frame::Error(err) => return Err(error_frame(err)),
                other => bail!("expected MSG, got {other:?}"),
            }
        }
    }

    /// Sends a request and waits for its response.
    pub async fn call(&mut self, body: ServiceRequest) -> anyhow::Result<ResponseEnvelope> {
        let service = body.name();
        let request_id = self.send(body).await?;
        self.receive_for(request_id)
            .await
            .with_context(|| format!("{service} request {request_id}"))
    }

    fn stash_message(&mut self, message: ServiceMessage) -> anyhow::Result<()> {
        let response = self.codec.decode_response(&message.payload)?;
        self.stash.push_back((message.request_id, response));
        Ok(())
    }

    /// CreateSession plus ActivateSession. The token is kept for later
    /// requests.
    pub async fn open_session(&mut self, name: &str) -> anyhow::Result<AuthenticationToken> {
        self.authentication_token = AuthenticationToken::default();
        let created = self
            .call(ServiceRequest::CreateSession(CreateSessionRequest {
                session_name: name.to_string(),
                requested_session_timeout_ms: 30_000,
            }))
            .await?;
        let ServiceResponse::CreateSession(created) = created.body else {
            bail!("CreateSession failed: {}", created.header.service_result);
        };

        self.authentication_token = created.authentication_token.clone();
        let activated = self
            .call(ServiceRequest::ActivateSession(ActivateSessionRequest::default()))
            .await?;
        if !activated.header.service_result.is_good() {
            bail!("ActivateSession failed: {}", activated.header.service_result);
        }
        Ok(created.authentication_token)
    }

    /// Closes the current session and its subscriptions.
    pub async fn close_session(&mut self) -> anyhow::Result<StatusCode> {
        let response = self
            .call(ServiceRequest::CloseSession(CloseSessionRequest {
                delete_subscriptions: true,
            }))
            .await?;
        Ok(response.header.service_result)
    }

    /// Creates a subscription.
    pub async fn create_subscription(
        &mut self,
        builder: SubscriptionBuilder,
    ) -> anyhow::Result<CreateSubscriptionResponse> {
        let response = self.call(builder.build()).await?;
        match response.body {
            ServiceResponse::CreateSubscription(created) => Ok(created),
            _ => bail!("CreateSubscription failed: {}", response.header.service_result),
        }
    }

    /// Sends a Publish request and waits for its response.
    pub async fn publish(&mut self, acks: &[(SubscriptionId, u32)]) -> anyhow::Result<PublishResponse> {
        let response = self.call(publish(acks)).await?;
        expect_publish(response)
    }
}

/// Unwraps a Publish response body.
pub fn expect_publish(response: ResponseEnvelope) -> anyhow::Result<PublishResponse> {
    match response.body {
        ServiceResponse::Publish(publish) => Ok(publish),
        _ => Err(anyhow!("Publish failed: {}", response.header.service_result)),
    }
}

fn error_frame(err: ErrorMessage) -> anyhow::Error {
    anyhow!("server sent ERR {}: {}", err.status, err.reason)
}
