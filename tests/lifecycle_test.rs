//! Integration tests for the session lifecycle: initialize, subscribe,
//! reconcile and unsubscribe against a mocked authority.

mod common;

use common::{ack, harness, status};
use push_lifecycle::platform::{Permission, PlatformCapabilities};
use push_lifecycle::reconcile::StatusSource;
use push_lifecycle::PushProvider;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_initialize_twice_registers_worker_and_loads_script_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .mount(&server)
        .await;
    let h = harness(server).await;

    assert!(h.service.initialize().await.expect("supported"));
    assert!(h.service.initialize().await.expect("supported"));

    assert_eq!(h.platform.register_calls(), 1);
    assert_eq!(h.sdk.script_loads(), 1);
    assert_eq!(h.sdk.init_calls(), 1);
    assert!(h.service.monitor().is_running());

    h.service.dispose();
    assert!(!h.service.monitor().is_running());
}

#[tokio::test]
async fn test_one_provider_failing_still_subscribes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, true))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .and(body_partial_json(serde_json::json!({"provider": "raw"})))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(server).await;
    h.sdk.fail_opt_in(true);

    h.service.initialize().await.expect("supported");
    let outcome = h.service.subscribe().await;

    assert!(outcome.subscribed());
    assert!(outcome.partial());
    assert!(outcome.raw.subscribed && outcome.raw.registered);
    assert!(!outcome.sdk.subscribed);
    assert!(outcome.summary().starts_with("Subscribed via raw only"));

    let snapshot = h.service.subscription_status();
    assert!(snapshot.is_subscribed);
    assert!(snapshot.raw);
    assert!(!snapshot.sdk);
    assert!(snapshot.verified);
    h.server.verify().await;
}

#[tokio::test]
async fn test_remote_unsubscribed_overrides_local_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ack())
        .mount(&server)
        .await;
    let h = harness(server).await;

    h.service.initialize().await.expect("supported");
    let outcome = h.service.subscribe().await;
    assert!(outcome.subscribed());
    assert!(h.service.raw().state().subscribed, "local cache says subscribed");

    let snapshot = h.service.subscription_status();
    assert!(!snapshot.is_subscribed);
    assert!(!snapshot.sdk && !snapshot.raw);
    assert!(!snapshot.is_deliverable());
}

#[tokio::test]
async fn test_authority_outage_falls_back_to_unverified_local_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let h = harness(server).await;

    h.service.initialize().await.expect("supported");
    let outcome = h.service.subscribe().await;
    assert!(outcome.subscribed(), "registration failure never blocks subscribe");
    assert!(!outcome.raw.registered);

    let status = h.service.refresh_status().await;
    assert_eq!(status.source, StatusSource::LocalFallback);
    let snapshot = h.service.subscription_status();
    assert!(snapshot.is_subscribed);
    assert!(!snapshot.verified);
}

#[tokio::test]
async fn test_fresh_session_subscribe_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(true, true))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ack())
        .expect(2)
        .mount(&server)
        .await;
    let h = harness(server).await;

    h.service.initialize().await.expect("supported");
    let before = h.service.subscription_status();
    assert!(before.is_supported);
    assert!(!before.is_subscribed);
    assert!(!before.has_permission);

    let outcome = h.service.subscribe().await;
    assert!(outcome.subscribed());
    assert!(!outcome.partial());
    assert_eq!(h.platform.permission_requests(), 1);
    assert_eq!(h.sdk.permission_requests(), 1);

    let after = h.service.subscription_status();
    assert!(after.is_subscribed);
    assert!(after.sdk);
    assert!(after.raw);
    assert!(after.has_permission);
    assert!(after.is_deliverable());

    h.server.verify().await;
}

#[tokio::test]
async fn test_denied_on_both_providers_reports_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ack())
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(server).await;
    h.platform.set_prompt_answer(Permission::Denied);
    h.sdk.set_prompt_answer(Permission::Denied);

    h.service.initialize().await.expect("supported");
    let outcome = h.service.subscribe().await;
    assert!(!outcome.subscribed());
    assert!(outcome.summary().contains("blocked"));
    assert!(!h.service.subscription_status().has_permission);
    h.server.verify().await;
}

#[tokio::test]
async fn test_unsubscribe_clears_local_state_even_when_revoke_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscribe"))
        .respond_with(ack())
        .mount(&server)
        .await;
    let h = harness(server).await;

    h.service.initialize().await.expect("supported");
    assert!(h.service.subscribe().await.subscribed());

    h.platform.fail_unsubscribe(true);
    let outcome = h.service.unsubscribe().await;
    assert!(!outcome.revoked);
    assert!(outcome.deregistered);
    assert!(!h.service.raw().state().subscribed);
    assert!(!h.service.sdk().state().subscribed);
    assert!(!h.service.subscription_status().is_subscribed);
}

#[tokio::test]
async fn test_raw_only_platform_without_sdk_support() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription-status"))
        .respond_with(status(false, false))
        .mount(&server)
        .await;
    let h = harness(server).await;
    h.sdk.set_capabilities(PlatformCapabilities::default());

    assert!(h.service.initialize().await.expect("raw still supported"));
    assert!(!h.service.sdk().state().supported);
    assert_eq!(h.sdk.script_loads(), 0);
    assert!(h.service.subscription_status().is_supported);
}

#[tokio::test]
async fn test_send_operations_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send-to-role"))
        .and(body_partial_json(serde_json::json!({
            "role": "instructor",
            "title": "Exam",
            "data": {"url": "/exams/4"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "sent": 12,
            "failed": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broadcast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "message": "not allowed"
        })))
        .mount(&server)
        .await;
    let h = harness(server).await;

    let report = h
        .service
        .send_to_role("instructor", "Exam", "Starts at 9", serde_json::json!({"url": "/exams/4"}))
        .await
        .expect("delivered");
    assert_eq!(report.sent, 12);
    assert_eq!(report.failed, 1);

    let err = h
        .service
        .broadcast("Hi", "All", serde_json::json!({}))
        .await
        .expect_err("rejected");
    assert!(err.to_string().contains("not allowed"));
    h.server.verify().await;
}
