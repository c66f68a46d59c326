// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection admission: caps, idle eviction, deferral and refusal.

use std::time::Duration;

use uasrv_core::{ChannelId, StatusCode};
use uasrv_server::ServerEvent;
use uasrv_tests::prelude::*;

#[tokio::test]
async fn test_full_server_with_sessions_refuses_then_admits_after_release() {
    let server = TestServer::start(ConfigFixtures::with_connection_cap(3, 2_000)).await;

    let mut clients = Vec::new();
    for index in 0..3 {
        let mut client = server.open_client().await;
        client.open_session(&format!("client-{index}")).await.unwrap();
        clients.push(client);
    }
    server.wait_for_channels(3).await;

    let mut rejected = server.client().await;
    let error = rejected.expect_error().await.unwrap();
    assert_error_frame(&error, StatusCode::BAD_TCP_SERVER_TOO_BUSY);
    rejected.expect_closed().await.unwrap();

    let stats = server.handle().stats();
    assert_eq!(stats.refused, 1);
    assert_eq!(stats.deferred, 0, "busy channels must not defer");
    assert_eq!(stats.active_channels, 3);

    let mut released = clients.remove(0);
    released.close().await.unwrap();
    released.expect_closed().await.unwrap();
    server.wait_for_channels(2).await;

    let mut retried = server.open_client().await;
    retried.open_session("retry").await.unwrap();
    server.wait_for_channels(3).await;

    let stats = server.handle().stats();
    assert_eq!(stats.accepted, 4);
    assert_eq!(stats.refused, 1);
    assert_eq!(stats.closed, 1);

    drop(clients);
    drop(retried);
    server.stop().await;
}

#[tokio::test]
async fn test_idle_channel_is_recycled_for_new_connection() {
    let server = TestServer::start(ConfigFixtures::with_connection_cap(2, 5_000)).await;

    let mut working = server.open_client().await;
    working.open_session("working").await.unwrap();
    let mut idle = server.client().await;
    server.wait_for_channels(2).await;

    let mut fresh = server.open_client().await;
    idle.expect_closed().await.unwrap();
    fresh.open_session("fresh").await.unwrap();

    let stats = server.handle().stats();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.refused, 0);
    assert_eq!(stats.active_channels, 2);

    let evicted = server
        .wait_for_event(|e| matches!(e, ServerEvent::ChannelEvicted { .. }))
        .await;
    assert_eq!(
        evicted,
        ServerEvent::ChannelEvicted {
            channel_id: ChannelId::new(2)
        }
    );

    // The channel holding a session survives the eviction.
    let response = working
        .call(browse(vec![NodeFixtures::folder()], 0))
        .await
        .unwrap();
    response.assert_good();

    server.stop().await;
}

#[tokio::test]
async fn test_pending_session_defers_admission_until_deadline() {
    let server = TestServer::start(ConfigFixtures::with_connection_cap(1, 300)).await;

    let mut pending = server.open_client().await;
    server.wait_for_channels(1).await;

    let started = tokio::time::Instant::now();
    let mut late = server.client().await;

    // The pending channel finishes its session while the newcomer waits; the
    // server is still full when the deadline passes.
    pending.open_session("pending").await.unwrap();

    let error = late.expect_error().await.unwrap();
    assert_error_frame(&error, StatusCode::BAD_TCP_SERVER_TOO_BUSY);
    assert!(started.elapsed() >= Duration::from_millis(250));

    let stats = server.handle().stats();
    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.refused, 1);
    assert!(server
        .events()
        .iter()
        .any(|e| matches!(e, ServerEvent::ConnectionRefused { .. })));

    server.stop().await;
}

#[tokio::test]
async fn test_deferred_connection_admitted_when_channel_closes() {
    let server = TestServer::start(ConfigFixtures::with_connection_cap(1, 5_000)).await;

    let mut pending = server.open_client().await;
    server.wait_for_channels(1).await;

    let mut late = server.client().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    pending.close().await.unwrap();

    late.open_channel().await.unwrap();
    late.open_session("late").await.unwrap();

    let stats = server.handle().stats();
    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.refused, 0);
    assert_eq!(stats.accepted, 2);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_every_channel() {
    let server = TestServer::start(ConfigFixtures::with_connection_cap(4, 5_000)).await;

    let mut a = server.open_client().await;
    a.open_session("a").await.unwrap();
    let mut b = server.open_client().await;
    server.wait_for_channels(2).await;

    server.stop().await;
    a.expect_closed().await.unwrap();
    b.expect_closed().await.unwrap();
}
