//! HTTP client for the authority service.
//!
//! This module provides the [`AuthorityClient`] struct which handles all
//! HTTP communication with the authority backend: bearer auth, JSON bodies,
//! per-request timeout and status classification.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::types::{
    AckResponse, DeliveryReport, HeartbeatRequest, NotificationRequest, PushStats,
    SubscribeRequest, SubscriptionStatusResponse, UnsubscribeRequest, VapidKeyResponse,
};
use super::{Authority, AuthorityError};
use crate::config::Config;

/// REST client for the authority.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: Client,
    base_url: String,
    token: String,
}

impl AuthorityClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the authority, e.g. `https://lms.example/api/notifications`
    /// * `token` - Bearer token; empty sends no `Authorization` header
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, token))
    }

    /// Creates a client from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(&config.authority_url, &config.token, config.request_timeout())
    }

    /// Creates a client with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthorityError> {
        let request = self.authorize(self.client.get(self.url(path)));
        Self::execute(path, request).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthorityError> {
        let request = self.authorize(self.client.post(self.url(path)).json(body));
        Self::execute(path, request).await
    }

    async fn execute<T: DeserializeOwned>(
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, AuthorityError> {
        log::debug!("[Authority] -> {path}");
        let response = request.send().await.map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::debug!("[Authority] <- {path} HTTP {}", status.as_u16());
            return Err(AuthorityError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                AuthorityError::Timeout
            } else {
                AuthorityError::Decode(e.to_string())
            }
        })
    }
}

fn classify_transport(e: reqwest::Error) -> AuthorityError {
    if e.is_timeout() {
        AuthorityError::Timeout
    } else {
        AuthorityError::Transport(e.to_string())
    }
}

fn require_ack(ack: AckResponse) -> Result<AckResponse, AuthorityError> {
    if ack.success {
        Ok(ack)
    } else {
        Err(AuthorityError::Rejected(
            ack.message.unwrap_or_else(|| "success=false".to_string()),
        ))
    }
}

fn require_delivery(report: DeliveryReport) -> Result<DeliveryReport, AuthorityError> {
    if report.success {
        Ok(report)
    } else {
        Err(AuthorityError::Rejected(
            report.message.unwrap_or_else(|| "success=false".to_string()),
        ))
    }
}

#[async_trait]
impl Authority for AuthorityClient {
    async fn subscription_status(&self) -> Result<SubscriptionStatusResponse, AuthorityError> {
        let status: SubscriptionStatusResponse = self.get_json("/subscription-status").await?;
        if !status.success {
            return Err(AuthorityError::Rejected(
                "subscription status unavailable".to_string(),
            ));
        }
        Ok(status)
    }

    async fn subscribe(&self, request: &SubscribeRequest) -> Result<AckResponse, AuthorityError> {
        require_ack(self.post_json("/subscribe", request).await?)
    }

    async fn unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<AckResponse, AuthorityError> {
        require_ack(self.post_json("/unsubscribe", request).await?)
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<AckResponse, AuthorityError> {
        require_ack(self.post_json("/heartbeat", request).await?)
    }

    async fn vapid_public_key(&self) -> Result<String, AuthorityError> {
        let key: VapidKeyResponse = self.get_json("/vapid/public-key").await?;
        if !key.success || key.public_key.is_empty() {
            return Err(AuthorityError::Rejected(
                "VAPID public key unavailable".to_string(),
            ));
        }
        Ok(key.public_key)
    }

    async fn send_test(&self) -> Result<DeliveryReport, AuthorityError> {
        require_delivery(self.post_json("/send-test", &serde_json::json!({})).await?)
    }

    async fn send_to_user(
        &self,
        request: &NotificationRequest,
    ) -> Result<DeliveryReport, AuthorityError> {
        require_delivery(self.post_json("/send-to-user", request).await?)
    }

    async fn send_to_role(
        &self,
        request: &NotificationRequest,
    ) -> Result<DeliveryReport, AuthorityError> {
        require_delivery(self.post_json("/send-to-role", request).await?)
    }

    async fn broadcast(
        &self,
        request: &NotificationRequest,
    ) -> Result<DeliveryReport, AuthorityError> {
        require_delivery(self.post_json("/broadcast", request).await?)
    }

    async fn stats(&self) -> Result<PushStats, AuthorityError> {
        self.get_json("/stats").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceFingerprint;
    use crate::provider::{ProviderKind, SubscriptionHandle};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AuthorityClient {
        AuthorityClient::new(&server.uri(), "test-token", Duration::from_secs(2))
            .expect("client")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = AuthorityClient::with_client(Client::new(), "https://example.com/api/", "k");
        assert_eq!(client.base_url(), "https://example.com/api");
    }

    #[tokio::test]
    async fn test_subscription_status_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscription-status"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "is_subscribed": true,
                "subscriptions": {"sdk": false, "raw": true},
                "details": {"total_devices": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let status = client_for(&server)
            .subscription_status()
            .await
            .expect("status");
        assert!(status.is_subscribed);
        assert!(status.subscriptions.raw);
        assert_eq!(status.details.total_devices, 2);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let request = HeartbeatRequest {
            device_id: "device_1".to_string(),
            endpoint: None,
            device_info: DeviceFingerprint::unknown(),
            timestamp: chrono::Utc::now(),
            subscription_valid: false,
        };
        let err = client_for(&server)
            .heartbeat(&request)
            .await
            .expect_err("503 must fail");
        match err {
            AuthorityError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_success_false_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/unsubscribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "unknown device"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .unsubscribe(&UnsubscribeRequest {
                device_id: "device_1".to_string(),
                provider: None,
            })
            .await
            .expect_err("rejected");
        assert!(matches!(err, AuthorityError::Rejected(ref m) if m == "unknown device"));
    }

    #[tokio::test]
    async fn test_subscribe_body_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscribe"))
            .and(body_partial_json(serde_json::json!({
                "provider": "sdk",
                "device_id": "device_1",
                "handle": {"provider": "sdk", "subscription_id": "abc"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = SubscribeRequest {
            provider: ProviderKind::Sdk,
            handle: SubscriptionHandle::Sdk {
                subscription_id: "abc".to_string(),
            },
            device_id: "device_1".to_string(),
            device_info: DeviceFingerprint::unknown(),
            last_verified: chrono::Utc::now(),
        };
        client_for(&server)
            .subscribe(&request)
            .await
            .expect("subscribe");
    }

    #[tokio::test]
    async fn test_vapid_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vapid/public-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "publicKey": "BExample"
            })))
            .mount(&server)
            .await;

        let key = client_for(&server).vapid_public_key().await.expect("key");
        assert_eq!(key, "BExample");
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = AuthorityClient::new(&server.uri(), "", Duration::from_millis(50))
            .expect("client");
        let err = client.stats().await.expect_err("must time out");
        assert!(matches!(err, AuthorityError::Timeout), "got {err}");
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let client = AuthorityClient::new("http://127.0.0.1:9", "", Duration::from_secs(1))
            .expect("client");
        let err = client.stats().await.expect_err("nothing listens on port 9");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_send_to_role_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-to-role"))
            .and(body_partial_json(serde_json::json!({
                "role": "instructor",
                "title": "Exam",
                "body": "Starts soon"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "sent": 4,
                "failed": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut request =
            NotificationRequest::new("Exam", "Starts soon", serde_json::Value::Null);
        request.role = Some("instructor".to_string());
        let report = client_for(&server)
            .send_to_role(&request)
            .await
            .expect("send");
        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 1);
    }
}
