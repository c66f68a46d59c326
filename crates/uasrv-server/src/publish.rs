// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Publish request queue of a session.
//!
//! Notifications are released only against a queued client request, so a
//! slow client throttles its own subscriptions.
//!
//! ```text
//!  Publish request ─► enqueue (FIFO, bounded) ─┐
//!                                              ├─► pop_request ─► response
//!  Subscription ready ─► request available? ───┘
//!                             │ no
//!                             ▼
//!                        late queue ─► served on the next request
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use uasrv_core::{ChannelId, RequestId, StatusCode, SubscriptionId};

/// A subscription acknowledgement carried by a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionAcknowledgement {
    /// Subscription id.
    pub subscription_id: SubscriptionId,
    /// Acknowledged sequence number.
    pub sequence_number: u32,
}

/// A queued publish request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPublish {
    /// Channel the request arrived on.
    pub channel_id: ChannelId,
    /// Channel request id to answer with.
    pub request_id: RequestId,
    /// Client request handle.
    pub request_handle: u32,
    /// Client timeout hint. Zero means none.
    pub timeout_hint: Duration,
    /// Arrival time.
    pub received_at: Instant,
    /// Results of the acknowledgements, in request order.
    pub ack_results: Vec<StatusCode>,
}

impl PendingPublish {
    /// Returns `true` once the timeout hint has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        !self.timeout_hint.is_zero() && now.duration_since(self.received_at) >= self.timeout_hint
    }
}

/// FIFO of publish requests plus the late subscription list.
#[derive(Debug)]
pub struct PublishEngine {
    requests: VecDeque<PendingPublish>,
    late: VecDeque<SubscriptionId>,
    registered: BTreeSet<SubscriptionId>,
    max_requests: usize,
}

impl PublishEngine {
    /// Creates an engine holding at most `max_requests` requests.
    pub fn new(max_requests: usize) -> Self {
        Self {
            requests: VecDeque::new(),
            late: VecDeque::new(),
            registered: BTreeSet::new(),
            max_requests: max_requests.max(1),
        }
    }

    /// Adds a subscription.
    pub fn register(&mut self, id: SubscriptionId) {
        self.registered.insert(id);
    }

    /// Removes a subscription and its late entry.
    pub fn unregister(&mut self, id: SubscriptionId) {
        self.registered.remove(&id);
        self.late.retain(|late| *late != id);
    }

    /// Returns the number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registered.len()
    }

    /// Returns the number of queued requests.
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Returns the number of late subscriptions.
    pub fn late_count(&self) -> usize {
        self.late.len()
    }

    /// Queues a request. When the queue is full the oldest request is
    /// evicted and returned so it can be answered with
    /// `BadTooManyPublishRequests`.
    pub fn enqueue(&mut self, request: PendingPublish) -> Option<PendingPublish> {
        let evicted = if self.requests.len() >= self.max_requests {
            self.requests.pop_front()
        } else {
            None
        };
        self.requests.push_back(request);
        evicted
    }

    /// Takes the oldest request.
    pub fn pop_request(&mut self) -> Option<PendingPublish> {
        self.requests.pop_front()
    }

    /// Records a subscription that had something ready but no request.
    pub fn mark_late(&mut self, id: SubscriptionId) {
        if self.registered.contains(&id) && !self.late.contains(&id) {
            self.late.push_back(id);
        }
    }

    /// Takes the longest-waiting late subscription.
    pub fn next_late(&mut self) -> Option<SubscriptionId> {
        self.late.pop_front()
    }

    /// Removes requests whose timeout hint has passed.
    pub fn expire_requests(&mut self, now: Instant) -> Vec<PendingPublish> {
        let (expired, kept): (VecDeque<_>, VecDeque<_>) = self
            .requests
            .drain(..)
            .partition(|request| request.is_expired(now));
        self.requests = kept;
        expired.into()
    }

    /// Drops the requests that arrived on a closed channel.
    pub fn discard_channel(&mut self, channel_id: ChannelId) -> usize {
        let before = self.requests.len();
        self.requests.retain(|request| request.channel_id != channel_id);
        before - self.requests.len()
    }

    /// Removes every request, for answering with `BadNoSubscription`.
    pub fn drain_requests(&mut self) -> Vec<PendingPublish> {
        self.requests.drain(..).collect()
    }

    /// Unregisters every subscription and returns the queued requests.
    pub fn shutdown(&mut self) -> Vec<PendingPublish> {
        self.registered.clear();
        self.late.clear();
        self.drain_requests()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u32, timeout_ms: u64) -> PendingPublish {
        PendingPublish {
            channel_id: ChannelId::new(1),
            request_id: RequestId::new(id),
            request_handle: id,
            timeout_hint: Duration::from_millis(timeout_ms),
            received_at: Instant::now(),
            ack_results: Vec::new(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut engine = PublishEngine::new(10);
        engine.enqueue(request(1, 0));
        engine.enqueue(request(2, 0));
        assert_eq!(engine.pop_request().unwrap().request_id, RequestId::new(1));
        assert_eq!(engine.pop_request().unwrap().request_id, RequestId::new(2));
        assert!(engine.pop_request().is_none());
    }

    #[test]
    fn test_full_queue_evicts_oldest() {
        let mut engine = PublishEngine::new(2);
        assert!(engine.enqueue(request(1, 0)).is_none());
        assert!(engine.enqueue(request(2, 0)).is_none());
        let evicted = engine.enqueue(request(3, 0)).unwrap();
        assert_eq!(evicted.request_id, RequestId::new(1));
        assert_eq!(engine.pending_requests(), 2);
    }

    #[test]
    fn test_late_is_deduplicated_and_requires_registration() {
        let mut engine = PublishEngine::new(4);
        let id = SubscriptionId::new(5);
        engine.mark_late(id);
        assert_eq!(engine.late_count(), 0);

        engine.register(id);
        engine.mark_late(id);
        engine.mark_late(id);
        assert_eq!(engine.late_count(), 1);
        engine.unregister(id);
        assert!(engine.next_late().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_requests() {
        let mut engine = PublishEngine::new(4);
        engine.enqueue(request(1, 100));
        engine.enqueue(request(2, 0));
        tokio::time::advance(Duration::from_millis(150)).await;

        let expired = engine.expire_requests(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].request_id, RequestId::new(1));
        assert_eq!(engine.pending_requests(), 1);
    }

    #[test]
    fn test_discard_channel_and_shutdown() {
        let mut engine = PublishEngine::new(4);
        engine.register(SubscriptionId::new(1));
        engine.enqueue(request(1, 0));
        let mut other = request(2, 0);
        other.channel_id = ChannelId::new(9);
        engine.enqueue(other);

        assert_eq!(engine.discard_channel(ChannelId::new(9)), 1);
        assert_eq!(engine.shutdown().len(), 1);
        assert_eq!(engine.subscription_count(), 0);
        assert_eq!(engine.pending_requests(), 0);
    }
}
