//! Shared fixtures: a mocked authority and a service over in-memory runtimes.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use push_lifecycle::health::HealthSchedule;
use push_lifecycle::platform::memory::{MemoryPushPlatform, MemorySdkRuntime};
use push_lifecycle::platform::{PushPlatform, SdkRuntime};
use push_lifecycle::storage::MemoryStore;
use push_lifecycle::{Config, PushService};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct Harness {
    pub server: MockServer,
    pub platform: Arc<MemoryPushPlatform>,
    pub sdk: Arc<MemorySdkRuntime>,
    pub service: Arc<PushService>,
}

pub fn ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true}))
}

pub fn status(sdk: bool, raw: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "success": true,
        "is_subscribed": sdk || raw,
        "subscriptions": {"sdk": sdk, "raw": raw},
        "details": {"total_devices": u64::from(sdk || raw)}
    }))
}

pub async fn mount_vapid_key(server: &MockServer) {
    let point = SigningKey::random(&mut OsRng)
        .verifying_key()
        .to_encoded_point(false);
    Mock::given(method("GET"))
        .and(path("/vapid/public-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "publicKey": URL_SAFE_NO_PAD.encode(point.as_bytes())
        })))
        .mount(server)
        .await;
}

/// Heartbeat and unsubscribe always acknowledge.
pub async fn mount_background_acks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/heartbeat"))
        .respond_with(ack())
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/unsubscribe"))
        .respond_with(ack())
        .mount(server)
        .await;
}

/// Monitoring cadence that never fires during a test.
pub fn quiet_schedule() -> HealthSchedule {
    HealthSchedule {
        check_interval: Duration::from_secs(3600),
        heartbeat_interval: Duration::from_secs(3600),
        initial_heartbeat_delay: Duration::from_secs(3600),
    }
}

/// Build a service against `server`. The caller mounts the status and
/// subscribe mocks it needs.
pub async fn harness(server: MockServer) -> Harness {
    mount_vapid_key(&server).await;
    mount_background_acks(&server).await;

    let config = Config {
        authority_url: server.uri(),
        token: "test-token".to_string(),
        sdk_app_id: "app-123".to_string(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    let platform = Arc::new(MemoryPushPlatform::new());
    let sdk = Arc::new(MemorySdkRuntime::new());
    let service = PushService::builder()
        .config(config)
        .store(Arc::new(MemoryStore::new()))
        .push_platform(Arc::clone(&platform) as Arc<dyn PushPlatform>)
        .sdk_runtime(Arc::clone(&sdk) as Arc<dyn SdkRuntime>)
        .schedule(quiet_schedule())
        .build()
        .expect("service builds");

    Harness {
        server,
        platform,
        sdk,
        service: Arc::new(service),
    }
}
