// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscriptions end to end: sequencing, keep-alives, republish, expiry,
//! queue overflow and monitoring modes.

use std::sync::Arc;
use std::time::Duration;

use uasrv_core::{
    DataValue, MonitoredItemId, MonitoringMode, NodeId, StatusCode, SubscriptionId, Variant,
};
use uasrv_server::service::{DeleteSubscriptionsRequest, PublishResponse};
use uasrv_server::{ServerEvent, ServiceRequest, ServiceResponse};
use uasrv_tests::prelude::*;

/// Publishes until a data message arrives, checking that every keep-alive on
/// the way announces `expected` as the next sequence number.
async fn next_data(
    client: &mut TestClient,
    acks: &[(SubscriptionId, u32)],
    expected: u32,
) -> PublishResponse {
    let mut acks = acks.to_vec();
    for _ in 0..50 {
        let response = client.publish(&acks).await.unwrap();
        acks.clear();
        if response.notification_message.is_keep_alive() {
            response.assert_keep_alive(expected);
            continue;
        }
        response.assert_data(expected);
        return response;
    }
    panic!("no data message after 50 publish requests");
}

async fn monitor(
    client: &mut TestClient,
    subscription_id: SubscriptionId,
    items: Vec<MonitoredItemBuilder>,
) -> Vec<MonitoredItemId> {
    let response = client
        .call(create_items(subscription_id, items))
        .await
        .unwrap();
    response.assert_good();
    let ServiceResponse::CreateMonitoredItems(created) = response.body else {
        panic!("expected create_monitored_items");
    };
    created
        .results
        .iter()
        .map(|result| {
            assert!(result.status_code.is_good(), "item rejected: {}", result.status_code);
            result.monitored_item_id
        })
        .collect()
}

#[tokio::test]
async fn test_sequence_numbers_are_contiguous_across_keep_alives() {
    let space = populated_space();
    let server = TestServer::start_with_space(ConfigFixtures::fast_publishing(), space.clone()).await;
    let mut client = server.open_client().await;
    client.open_session("sequencing").await.unwrap();

    let subscription = client
        .create_subscription(SubscriptionBuilder::new().interval_ms(100.0).keep_alive(2))
        .await
        .unwrap();
    assert_eq!(subscription.revised_publishing_interval_ms, 100.0);
    assert_eq!(subscription.revised_max_keep_alive_count, 2);
    let id = subscription.subscription_id;
    monitor(&mut client, id, vec![MonitoredItemBuilder::new(NodeFixtures::temperature(), 7)]).await;

    let first = next_data(&mut client, &[], 1).await;
    assert_eq!(first.subscription_id, id);
    assert_eq!(first.values_for(7), vec![Variant::Double(20.0)]);

    // Nothing changes: the next response is a keep-alive announcing 2.
    let keep_alive = client.publish(&[(id, 1)]).await.unwrap();
    keep_alive.assert_keep_alive(2);
    assert_eq!(keep_alive.results, vec![StatusCode::GOOD]);
    assert!(keep_alive.available_sequence_numbers.is_empty());

    let mut acks = Vec::new();
    for (expected, value) in [(2u32, 21.0f64), (3, 22.0), (4, 23.0)] {
        space.set_value(&NodeFixtures::temperature(), DataValue::new(value));
        let data = next_data(&mut client, &acks, expected).await;
        assert_eq!(data.values_for(7).last(), Some(&Variant::Double(value)));
        acks = vec![(id, expected)];
    }

    server.stop().await;
}

#[tokio::test]
async fn test_republish_until_acknowledged() {
    let server = TestServer::start(ConfigFixtures::fast_publishing()).await;
    let mut client = server.open_client().await;
    client.open_session("republish").await.unwrap();

    let id = client
        .create_subscription(SubscriptionBuilder::new().interval_ms(50.0))
        .await
        .unwrap()
        .subscription_id;
    monitor(&mut client, id, vec![MonitoredItemBuilder::new(NodeFixtures::pressure(), 1)]).await;

    let original = next_data(&mut client, &[], 1).await;

    let again = client.call(republish(id, 1)).await.unwrap();
    again.assert_good();
    let ServiceResponse::Republish(again) = again.body else {
        panic!("expected republish");
    };
    assert_eq!(again.notification_message, original.notification_message);

    let acked = client.publish(&[(id, 1), (id, 42)]).await.unwrap();
    assert_eq!(
        acked.results,
        vec![StatusCode::GOOD, StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN]
    );

    client
        .call(republish(id, 1))
        .await
        .unwrap()
        .assert_fault(StatusCode::BAD_MESSAGE_NOT_AVAILABLE);

    server.stop().await;
}

#[tokio::test]
async fn test_subscription_without_publish_requests_expires() {
    let server = TestServer::start(ConfigFixtures::fast_publishing()).await;
    let mut client = server.open_client().await;
    client.open_session("expiring").await.unwrap();

    let created = client
        .create_subscription(SubscriptionBuilder::new().interval_ms(50.0).keep_alive(1).lifetime(3))
        .await
        .unwrap();
    assert_eq!(created.revised_lifetime_count, 3);

    let expired = server
        .wait_for_event(|e| matches!(e, ServerEvent::SubscriptionExpired { .. }))
        .await;
    assert!(matches!(
        expired,
        ServerEvent::SubscriptionExpired { subscription_id, .. } if subscription_id == created.subscription_id
    ));

    let last_word = client.publish(&[]).await.unwrap();
    assert_eq!(last_word.subscription_id, created.subscription_id);
    assert_eq!(
        last_word.notification_message.status_change,
        Some(StatusCode::BAD_TIMEOUT)
    );
    assert_eq!(last_word.notification_message.sequence_number, 1);

    client
        .call(publish(&[]))
        .await
        .unwrap()
        .assert_fault(StatusCode::BAD_NO_SUBSCRIPTION);

    server.stop().await;
}

#[tokio::test]
async fn test_queue_overflow_honors_discard_policy() {
    let space = populated_space();
    let server = TestServer::start_with_space(ConfigFixtures::fast_publishing(), space.clone()).await;
    let mut client = server.open_client().await;
    client.open_session("overflow").await.unwrap();

    let id = client
        .create_subscription(SubscriptionBuilder::new().interval_ms(800.0).keep_alive(5))
        .await
        .unwrap()
        .subscription_id;
    monitor(
        &mut client,
        id,
        vec![
            MonitoredItemBuilder::new(NodeFixtures::temperature(), 1).queue(2, true),
            MonitoredItemBuilder::new(NodeFixtures::temperature(), 2).queue(2, false),
        ],
    )
    .await;

    // Queue the request first so the first tick answers it.
    let pending = client.send(publish(&[])).await.unwrap();
    for value in [1.0f64, 2.0, 3.0] {
        space.set_value(&NodeFixtures::temperature(), DataValue::new(value));
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    let response = expect_publish(client.receive_for(pending).await.unwrap()).unwrap();
    response.assert_data(1);

    let newest: Vec<_> = response
        .notification_message
        .notifications
        .iter()
        .filter(|n| n.client_handle == 1)
        .collect();
    assert_eq!(response.values_for(1), vec![Variant::Double(2.0), Variant::Double(3.0)]);
    assert!(newest[0].value.status.has_overflow());
    assert!(!newest[1].value.status.has_overflow());

    let earliest: Vec<_> = response
        .notification_message
        .notifications
        .iter()
        .filter(|n| n.client_handle == 2)
        .collect();
    assert_eq!(response.values_for(2), vec![Variant::Double(20.0), Variant::Double(1.0)]);
    assert!(!earliest[0].value.status.has_overflow());
    assert!(earliest[1].value.status.has_overflow());

    server.stop().await;
}

#[tokio::test]
async fn test_disabled_item_stops_sampling() {
    let node = NodeId::numeric(3, 1);
    let mock = Arc::new(MockAddressSpace::new());
    mock.set(node.clone(), 1i32);
    let server = TestServer::start_with_space(ConfigFixtures::fast_publishing(), mock.clone()).await;
    let mut client = server.open_client().await;
    client.open_session("sampling").await.unwrap();

    let id = client
        .create_subscription(SubscriptionBuilder::new().interval_ms(200.0))
        .await
        .unwrap()
        .subscription_id;
    let items = monitor(
        &mut client,
        id,
        vec![MonitoredItemBuilder::new(node.clone(), 1).sampling_ms(50.0)],
    )
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(mock.read_count(&node) >= 3, "item was not sampled");

    let results = status_results(
        &client
            .call(set_monitoring_mode(id, MonitoringMode::Disabled, items.clone()))
            .await
            .unwrap(),
    );
    assert_eq!(results, vec![StatusCode::GOOD]);

    let frozen = mock.read_count(&node);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(mock.read_count(&node) <= frozen + 1, "disabled item kept sampling");

    client
        .call(set_monitoring_mode(id, MonitoringMode::Reporting, items))
        .await
        .unwrap()
        .assert_good();
    let resumed = mock.read_count(&node);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(mock.read_count(&node) > resumed + 1);

    server.stop().await;
}

#[tokio::test]
async fn test_excess_publish_requests_drop_the_oldest() {
    let mut config = ConfigFixtures::fast_publishing();
    config.subscription.max_publish_requests = 2;
    let server = TestServer::start(config).await;
    let mut client = server.open_client().await;
    client.open_session("flood").await.unwrap();

    let id = client
        .create_subscription(SubscriptionBuilder::new().interval_ms(1_000.0).keep_alive(100))
        .await
        .unwrap()
        .subscription_id;

    let first = client.send(publish(&[])).await.unwrap();
    let _second = client.send(publish(&[])).await.unwrap();
    let _third = client.send(publish(&[])).await.unwrap();

    client
        .receive_for(first)
        .await
        .unwrap()
        .assert_fault(StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS);

    // Deleting the only subscription answers the queued requests.
    let deleted = client
        .call(ServiceRequest::DeleteSubscriptions(DeleteSubscriptionsRequest {
            subscription_ids: vec![id],
        }))
        .await
        .unwrap();
    assert_eq!(status_results(&deleted), vec![StatusCode::GOOD]);

    for _ in 0..2 {
        let (_, response) = client.receive().await.unwrap();
        response.assert_fault(StatusCode::BAD_NO_SUBSCRIPTION);
    }

    server.stop().await;
}
