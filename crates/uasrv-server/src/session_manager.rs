// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session table of the engine.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::Instant;
use uasrv_config::{ServerConfig, SessionConfig};
use uasrv_core::{
    AuthenticationToken, ChannelId, IdSequence, SessionError, SessionId, SharedSequence,
};

use crate::events::TimerEvent;
use crate::session::{Session, SessionLimits};

/// Owns every session and indexes them by authentication token.
#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    by_token: HashMap<AuthenticationToken, SessionId>,
    session_ids: IdSequence,
    subscription_ids: SharedSequence,
    config: SessionConfig,
    limits: SessionLimits,
    sink: mpsc::Sender<TimerEvent>,
}

impl SessionManager {
    /// Creates an empty table. Subscription ids are drawn from
    /// `subscription_ids` and are unique across all sessions.
    pub fn new(config: &ServerConfig, subscription_ids: SharedSequence, sink: mpsc::Sender<TimerEvent>) -> Self {
        Self {
            sessions: HashMap::new(),
            by_token: HashMap::new(),
            session_ids: IdSequence::new(),
            subscription_ids,
            config: config.session.clone(),
            limits: SessionLimits::from_config(config),
            sink,
        }
    }

    /// Returns the number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Creates a session on `channel_id`.
    pub fn create(
        &mut self,
        name: &str,
        requested_timeout_ms: u64,
        channel_id: ChannelId,
    ) -> Result<&Session, SessionError> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(SessionError::too_many_sessions(self.config.max_sessions));
        }

        let id = SessionId::new(self.session_ids.next());
        let timeout = self.config.revise_timeout(requested_timeout_ms);
        let session = Session::new(
            id,
            name,
            channel_id,
            timeout,
            self.limits,
            self.subscription_ids.clone(),
            self.sink.clone(),
        );
        self.by_token.insert(session.token().clone(), id);

        tracing::info!(
            session_id = %id,
            channel_id = %channel_id,
            name,
            timeout_ms = timeout.as_millis() as u64,
            "Session created"
        );
        Ok(self.sessions.entry(id).or_insert(session))
    }

    /// Resolves an authentication token.
    pub fn lookup(&mut self, token: &AuthenticationToken) -> Result<&mut Session, SessionError> {
        let id = self
            .by_token
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;
        self.sessions.get_mut(&id).ok_or(SessionError::InvalidToken)
    }

    /// Looks up a session by id.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Removes a session from the table.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_token.remove(session.token());
        Some(session)
    }

    /// Removes and returns sessions whose timeout elapsed.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Session> {
        let expired: Vec<_> = self
            .sessions
            .values()
            .filter(|session| session.is_expired(now))
            .map(Session::id)
            .collect();
        expired.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Detaches every session bound to a closed channel.
    pub fn on_channel_closed(&mut self, channel_id: ChannelId) {
        for session in self.sessions.values_mut() {
            session.on_channel_closed(channel_id);
        }
    }

    /// Iterates over all sessions.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Iterates mutably over all sessions.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Removes every session.
    pub fn drain(&mut self) -> Vec<Session> {
        self.by_token.clear();
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}
