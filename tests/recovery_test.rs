//! Integration tests for health checks and recovery.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{ack, harness, status};
use push_lifecycle::health::UnhealthyReason;
use push_lifecycle::platform::memory::MemoryPushPlatform;
use push_lifecycle::platform::{Permission, WorkerState};
use push_lifecycle::PushProvider;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

async fn wait_for_subscribe_calls(platform: &MemoryPushPlatform, calls: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while platform.subscribe_calls() < calls {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("recovery reaches the re-subscribe step");
}

async fn subscribe_posts(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|r| r.url.path() == "/subscribe")
        .count()
}

async fn mount_authority(server: &MockServer, raw_registered: bool) {
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, raw_registered))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ack())
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_expired_subscription_is_reported_unhealthy() {
    let server = MockServer::start().await;
    mount_authority(&server, true).await;
    let h = harness(server).await;
    h.platform
        .set_new_subscription_expiry(Some(Utc::now() - ChronoDuration::minutes(5)));

    h.service.initialize().await.expect("supported");
    h.service.subscribe().await;

    let snapshot = h.service.monitor().check_liveness().await;
    assert!(!snapshot.healthy);
    assert_eq!(snapshot.reason, Some(UnhealthyReason::Expired));
    assert_eq!(snapshot.reason.map(|r| r.to_string()).as_deref(), Some("expired"));
}

#[tokio::test]
async fn test_concurrent_recover_is_a_no_op() {
    let server = MockServer::start().await;
    mount_authority(&server, false).await;
    let h = harness(server).await;
    h.service.initialize().await.expect("supported");
    assert!(h.service.subscribe().await.subscribed());
    h.platform.set_subscription(None);

    h.platform.hold_subscribe();
    let service = Arc::clone(&h.service);
    let first = tokio::spawn(async move { service.recover().await });
    wait_for_subscribe_calls(&h.platform, 2).await;

    assert!(!h.service.recover().await, "overlapping recover returns false");
    assert_eq!(h.platform.subscribe_calls(), 2);

    h.platform.release_subscribe();
    assert!(first.await.expect("join"), "first recovery completes");
    assert_eq!(h.platform.subscribe_calls(), 2);
    assert!(h.platform.current_subscription().is_some());
}

#[tokio::test]
async fn test_recover_never_prompts_when_permission_denied() {
    let server = MockServer::start().await;
    mount_authority(&server, false).await;
    let h = harness(server).await;
    h.platform.set_permission(Permission::Denied);
    h.sdk.set_permission(Permission::Denied);
    h.service.initialize().await.expect("supported");
    assert!(!h.service.subscribe().await.subscribed());
    assert!(h.service.raw().wants_subscription());

    assert!(!h.service.recover().await);
    assert_eq!(h.platform.permission_requests(), 0);
    assert_eq!(h.sdk.permission_requests(), 0);
    assert_eq!(h.platform.subscribe_calls(), 0);
}

#[tokio::test]
async fn test_background_repair_leaves_unsubscribed_device_alone() {
    let server = MockServer::start().await;
    mount_authority(&server, false).await;
    let h = harness(server).await;
    h.service.initialize().await.expect("supported");
    assert!(h.service.subscribe().await.subscribed());

    h.service.unsubscribe().await;
    assert!(h.platform.current_subscription().is_none());
    assert!(h.service.raw().permission_state().is_granted());
    let registrations = subscribe_posts(&h.server).await;

    let snapshot = h.service.monitor().tick().await;
    assert!(snapshot.healthy, "opted-out device is not a failure");
    assert!(h.service.recover().await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.platform.subscribe_calls(), 1);
    assert!(h.platform.current_subscription().is_none());
    assert!(!h.service.raw().state().subscribed);
    assert_eq!(subscribe_posts(&h.server).await, registrations);
    assert!(!h.service.subscription_status().is_subscribed);
}

#[tokio::test]
async fn test_unhealthy_tick_starts_exactly_one_recovery() {
    let server = MockServer::start().await;
    mount_authority(&server, true).await;
    let h = harness(server).await;
    h.service.initialize().await.expect("supported");
    assert!(h.service.subscribe().await.subscribed());
    assert_eq!(h.platform.register_calls(), 1);
    assert_eq!(h.platform.subscribe_calls(), 1);

    h.platform.set_registration(None);
    h.platform.set_subscription(None);
    h.platform.hold_subscribe();

    let first = h.service.monitor().tick().await;
    assert_eq!(first.reason, Some(UnhealthyReason::NoServiceWorker));
    wait_for_subscribe_calls(&h.platform, 2).await;

    // The first recovery is parked on the re-subscribe step.
    let second = h.service.monitor().tick().await;
    assert_eq!(second.reason, Some(UnhealthyReason::NoSubscription));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.platform.register_calls(), 2);
    assert_eq!(h.platform.subscribe_calls(), 2);

    h.platform.release_subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !h.service.monitor().check_liveness().await.healthy {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("recovery repairs the device");
    assert_eq!(h.platform.register_calls(), 2);
    assert_eq!(h.platform.subscribe_calls(), 2);
}

#[tokio::test]
async fn test_recover_reregisters_worker_and_subscription() {
    let server = MockServer::start().await;
    mount_authority(&server, true).await;
    let h = harness(server).await;
    h.service.initialize().await.expect("supported");
    assert!(h.service.subscribe().await.subscribed());

    h.platform.set_registration(None);
    h.platform.set_subscription(None);
    assert_eq!(
        h.service.monitor().check_liveness().await.reason,
        Some(UnhealthyReason::NoServiceWorker)
    );

    assert!(h.service.recover().await);
    assert_eq!(h.platform.register_calls(), 2);
    assert_eq!(h.platform.subscribe_calls(), 2);
    assert_eq!(h.platform.permission_requests(), 1, "only the user-initiated prompt");
    assert!(h.service.monitor().check_liveness().await.healthy);
}

#[tokio::test]
async fn test_recover_pushes_handle_when_authority_disagrees() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ack())
        .expect(2)
        .mount(&server)
        .await;
    let h = harness(server).await;
    h.sdk.set_capabilities(push_lifecycle::platform::PlatformCapabilities::default());
    h.service.initialize().await.expect("supported");
    assert!(h.service.subscribe().await.subscribed());

    assert!(h.service.recover().await);
    assert!(h.service.raw().state().subscribed);
    h.server.verify().await;
}

#[tokio::test]
async fn test_waiting_worker_is_repaired() {
    let server = MockServer::start().await;
    mount_authority(&server, true).await;
    let h = harness(server).await;
    h.platform.set_new_worker_state(WorkerState::Waiting);
    h.service.initialize().await.expect("supported");

    assert_eq!(
        h.service.monitor().check_liveness().await.reason,
        Some(UnhealthyReason::WorkerNotActive)
    );

    h.platform.set_new_worker_state(WorkerState::Active);
    h.platform.set_permission(Permission::Granted);
    assert!(h.service.recover().await);
    assert!(h.service.monitor().check_liveness().await.healthy);
}

#[tokio::test]
async fn test_heartbeat_reports_endpoint() {
    let server = MockServer::start().await;
    mount_authority(&server, true).await;
    let h = harness(server).await;
    h.service.initialize().await.expect("supported");
    h.service.subscribe().await;

    assert!(h.service.monitor().heartbeat().await);
    let requests = h.server.received_requests().await.expect("recording enabled");
    let beat = requests
        .iter()
        .find(|r| r.url.path() == "/heartbeat")
        .expect("heartbeat sent");
    let body: serde_json::Value = serde_json::from_slice(&beat.body).expect("json");
    assert_eq!(body["device_id"], h.service.device_id());
    assert_eq!(body["subscription_valid"], true);
    assert!(body["endpoint"].as_str().is_some_and(|e| e.starts_with("https://")));
}
