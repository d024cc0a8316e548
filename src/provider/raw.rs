//! Raw Web Push adapter.
//!
//! Registers the push service worker, subscribes through `PushManager` with
//! the authority's VAPID key, and exposes the worker/subscription probes the
//! health monitor and recovery coordinator need.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

use super::vapid::decode_application_server_key;
use super::{ProviderKind, ProviderState, PushProvider, SubscriptionHandle};
use crate::authority::Authority;
use crate::constants;
use crate::lock;
use crate::platform::{Permission, PlatformError, PushPlatform, PushSubscription, WorkerRegistration};

/// Adapter over a [`PushPlatform`].
pub struct RawPushProvider {
    platform: Arc<dyn PushPlatform>,
    authority: Arc<dyn Authority>,
    worker_path: String,
    worker_scope: String,
    server_key: Mutex<Option<Vec<u8>>>,
    state: Mutex<ProviderState>,
    opted_in: Mutex<Option<bool>>,
    init_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RawPushProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawPushProvider")
            .field("worker_path", &self.worker_path)
            .field("worker_scope", &self.worker_scope)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RawPushProvider {
    /// Create an adapter registering the worker at `worker_path`.
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        authority: Arc<dyn Authority>,
        worker_path: &str,
    ) -> Self {
        Self {
            platform,
            authority,
            worker_path: worker_path.to_string(),
            worker_scope: constants::SERVICE_WORKER_SCOPE.to_string(),
            server_key: Mutex::new(None),
            state: Mutex::new(ProviderState::pending()),
            opted_in: Mutex::new(None),
            init_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current service worker registration.
    pub async fn worker_registration(&self) -> Result<Option<WorkerRegistration>, PlatformError> {
        self.platform.registration().await
    }

    /// Current push subscription as the platform reports it.
    pub async fn current_subscription(&self) -> Result<Option<PushSubscription>, PlatformError> {
        self.platform.subscription().await
    }

    /// Whether the user wants this device subscribed.
    ///
    /// Adopted from the platform on the first successful refresh, then set
    /// by [`PushProvider::subscribe`] and cleared by
    /// [`PushProvider::unsubscribe`]. Background repair only acts while set.
    pub fn wants_subscription(&self) -> bool {
        lock(&self.opted_in).unwrap_or(false)
    }

    /// Register the service worker again.
    pub async fn reregister_worker(&self) -> Result<WorkerRegistration, PlatformError> {
        let registration = self
            .platform
            .register_service_worker(&self.worker_path, &self.worker_scope)
            .await?;
        lock(&self.state).initialized = true;
        log::info!(
            "[WebPush] Service worker registered ({:?}) at {}",
            registration.state,
            registration.scope
        );
        Ok(registration)
    }

    /// Replace a missing or stale subscription without prompting.
    ///
    /// Returns `Ok(false)` when permission is not already granted; the user
    /// has to re-initiate subscription manually in that case.
    pub async fn resubscribe_silently(&self) -> Result<bool, PlatformError> {
        let permission = self.platform.permission();
        lock(&self.state).permission = permission;
        if !permission.is_granted() {
            log::info!("[WebPush] Not resubscribing: permission is {permission}");
            return Ok(false);
        }

        if let Ok(Some(stale)) = self.platform.subscription().await {
            log::debug!("[WebPush] Dropping stale subscription {}", stale.endpoint);
            if let Err(e) = self.platform.unsubscribe().await {
                log::warn!("[WebPush] Failed to drop stale subscription: {e}");
            }
        }

        let key = self.application_server_key().await?;
        let subscription = self.platform.subscribe(&key).await?;
        self.store_subscription(subscription);
        Ok(true)
    }

    async fn application_server_key(&self) -> Result<Vec<u8>, PlatformError> {
        if let Some(key) = lock(&self.server_key).clone() {
            return Ok(key);
        }
        let encoded = self
            .authority
            .vapid_public_key()
            .await
            .map_err(|e| PlatformError::Runtime(format!("VAPID key unavailable: {e}")))?;
        let key = decode_application_server_key(&encoded)
            .map_err(|e| PlatformError::Runtime(format!("{e:#}")))?;
        *lock(&self.server_key) = Some(key.clone());
        Ok(key)
    }

    fn store_subscription(&self, subscription: PushSubscription) {
        log::info!("[WebPush] Subscribed at {}", subscription.endpoint);
        let mut state = lock(&self.state);
        state.subscribed = true;
        state.permission = Permission::Granted;
        state.handle = Some(SubscriptionHandle::Raw(subscription));
    }

    fn mark_unsupported(&self) {
        let mut state = lock(&self.state);
        if state.supported {
            log::warn!("[WebPush] Service worker or PushManager missing; provider disabled");
        }
        state.supported = false;
        state.initialized = false;
        state.clear_subscription();
    }

    fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    async fn worker_probe(&self) -> bool {
        matches!(self.platform.registration().await, Ok(Some(_)))
    }

    async fn create_subscription(&self) -> bool {
        let key = match self.application_server_key().await {
            Ok(key) => key,
            Err(e) => {
                log::warn!("[WebPush] Cannot subscribe: {e}");
                return false;
            }
        };
        match self.platform.subscribe(&key).await {
            Ok(subscription) => {
                self.store_subscription(subscription);
                true
            }
            Err(PlatformError::PermissionDenied) => {
                lock(&self.state).permission = self.platform.permission();
                false
            }
            Err(e) => {
                log::warn!("[WebPush] Subscribe failed: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl PushProvider for RawPushProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Raw
    }

    async fn initialize(&self) -> bool {
        if !lock(&self.state).supported {
            return false;
        }
        if !self.platform.capabilities().supports_push() {
            self.mark_unsupported();
            return false;
        }
        if self.is_initialized() && self.worker_probe().await {
            return true;
        }

        let _gate = self.init_gate.lock().await;
        if self.is_initialized() && self.worker_probe().await {
            return true;
        }

        if let Err(e) = self.reregister_worker().await {
            log::warn!("[WebPush] Service worker registration failed: {e}");
            return false;
        }
        self.refresh().await;
        true
    }

    fn permission_state(&self) -> Permission {
        self.platform.permission()
    }

    async fn subscribe(&self) -> bool {
        if !self.initialize().await {
            return false;
        }
        *lock(&self.opted_in) = Some(true);

        match self.platform.permission() {
            Permission::Granted => {
                if let Ok(Some(existing)) = self.platform.subscription().await {
                    if !existing.is_expired(Utc::now()) {
                        self.store_subscription(existing);
                        return true;
                    }
                    log::info!("[WebPush] Existing subscription expired; replacing");
                    return match self.resubscribe_silently().await {
                        Ok(replaced) => replaced,
                        Err(e) => {
                            log::warn!("[WebPush] Replacing expired subscription failed: {e}");
                            false
                        }
                    };
                }
                self.create_subscription().await
            }
            Permission::Denied => {
                log::info!("[WebPush] Notifications blocked by user");
                lock(&self.state).permission = Permission::Denied;
                false
            }
            Permission::Default => match self.platform.request_permission().await {
                Ok(Permission::Granted) => {
                    lock(&self.state).permission = Permission::Granted;
                    self.create_subscription().await
                }
                Ok(answer) => {
                    log::info!("[WebPush] Permission prompt answered {answer}");
                    lock(&self.state).permission = answer;
                    false
                }
                Err(e) => {
                    log::warn!("[WebPush] Permission request failed: {e}");
                    false
                }
            },
        }
    }

    async fn unsubscribe(&self) -> bool {
        *lock(&self.opted_in) = Some(false);
        let ok = match self.platform.unsubscribe().await {
            Ok(existed) => {
                if !existed {
                    log::debug!("[WebPush] No subscription to drop");
                }
                true
            }
            Err(e) => {
                log::warn!("[WebPush] Unsubscribe failed: {e}");
                false
            }
        };
        lock(&self.state).clear_subscription();
        ok
    }

    fn subscription_handle(&self) -> Option<SubscriptionHandle> {
        lock(&self.state).handle.clone()
    }

    fn state(&self) -> ProviderState {
        lock(&self.state).clone()
    }

    async fn refresh(&self) -> ProviderState {
        if !self.is_initialized() {
            return self.state();
        }

        let permission = self.platform.permission();
        let subscription = self.platform.subscription().await;

        if let Ok(found) = &subscription {
            let mut opted_in = lock(&self.opted_in);
            if opted_in.is_none() {
                *opted_in = Some(found.is_some());
            }
        }

        let mut state = lock(&self.state);
        state.permission = permission;
        match subscription {
            Ok(Some(sub)) if !sub.is_expired(Utc::now()) => {
                state.subscribed = true;
                state.handle = Some(SubscriptionHandle::Raw(sub));
            }
            Ok(_) => state.clear_subscription(),
            Err(e) => log::warn!("[WebPush] Could not read subscription: {e}"),
        }
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::AuthorityClient;
    use crate::platform::memory::MemoryPushPlatform;
    use crate::platform::{PlatformCapabilities, WorkerState};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::rand_core::OsRng;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn vapid_server() -> MockServer {
        let server = MockServer::start().await;
        let point = SigningKey::random(&mut OsRng)
            .verifying_key()
            .to_encoded_point(false);
        Mock::given(method("GET"))
            .and(path("/vapid/public-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "publicKey": URL_SAFE_NO_PAD.encode(point.as_bytes())
            })))
            .mount(&server)
            .await;
        server
    }

    fn provider(platform: &Arc<MemoryPushPlatform>, server: &MockServer) -> RawPushProvider {
        let authority = AuthorityClient::new(&server.uri(), "t", Duration::from_secs(2))
            .expect("client");
        RawPushProvider::new(
            Arc::clone(platform) as Arc<dyn PushPlatform>,
            Arc::new(authority),
            "/push-sw.js",
        )
    }

    #[tokio::test]
    async fn test_initialize_registers_worker_once() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        let raw = provider(&platform, &server);

        assert!(raw.initialize().await);
        assert!(raw.initialize().await);
        assert_eq!(platform.register_calls(), 1);
        assert!(raw.state().initialized);
    }

    #[tokio::test]
    async fn test_initialize_reregisters_when_worker_vanished() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        let raw = provider(&platform, &server);

        assert!(raw.initialize().await);
        platform.set_registration(None);
        assert!(raw.initialize().await);
        assert_eq!(platform.register_calls(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::unsupported());
        let raw = provider(&platform, &server);

        assert!(!raw.initialize().await);
        platform.set_capabilities(PlatformCapabilities::full());
        assert!(!raw.initialize().await);
        assert!(!raw.subscribe().await);
        assert_eq!(platform.register_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_prompts_then_short_circuits() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        let raw = provider(&platform, &server);

        assert!(raw.subscribe().await);
        assert_eq!(platform.permission_requests(), 1);
        assert_eq!(platform.subscribe_calls(), 1);
        let handle = raw.subscription_handle().expect("handle");
        assert!(handle.endpoint().is_some());

        assert!(raw.subscribe().await);
        assert_eq!(platform.permission_requests(), 1);
        assert_eq!(platform.subscribe_calls(), 1, "existing subscription reused");
    }

    #[tokio::test]
    async fn test_denied_returns_false() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        platform.set_prompt_answer(Permission::Denied);
        let raw = provider(&platform, &server);

        assert!(!raw.subscribe().await);
        assert_eq!(raw.state().permission, Permission::Denied);
        assert_eq!(platform.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscription_intent_follows_user_actions() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        platform.set_permission(Permission::Granted);
        platform
            .register_service_worker("/push-sw.js", "/")
            .await
            .expect("register");
        platform.subscribe(&[4u8; 65]).await.expect("subscribe");
        let raw = provider(&platform, &server);

        assert!(!raw.wants_subscription(), "unknown before the first refresh");
        assert!(raw.initialize().await);
        assert!(raw.wants_subscription(), "adopted from the existing subscription");

        assert!(raw.unsubscribe().await);
        assert!(!raw.wants_subscription());
        raw.refresh().await;
        assert!(!raw.wants_subscription(), "refresh does not override an opt-out");

        assert!(raw.subscribe().await);
        assert!(raw.wants_subscription());
    }

    #[tokio::test]
    async fn test_unsubscribe_failure_still_clears_state() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        let raw = provider(&platform, &server);
        assert!(raw.subscribe().await);

        platform.fail_unsubscribe(true);
        assert!(!raw.unsubscribe().await);
        assert!(!raw.state().subscribed);
        assert!(raw.subscription_handle().is_none());
    }

    #[tokio::test]
    async fn test_resubscribe_silently_never_prompts() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        let raw = provider(&platform, &server);
        assert!(raw.initialize().await);

        assert!(!raw.resubscribe_silently().await.expect("no error"));
        assert_eq!(platform.permission_requests(), 0);
        assert_eq!(platform.subscribe_calls(), 0);

        platform.set_permission(Permission::Granted);
        assert!(raw.resubscribe_silently().await.expect("resubscribes"));
        assert!(raw.state().subscribed);
        assert_eq!(platform.permission_requests(), 0);
    }

    #[tokio::test]
    async fn test_refresh_drops_expired_subscription() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        let raw = provider(&platform, &server);
        assert!(raw.subscribe().await);

        let mut sub = platform.current_subscription().expect("subscription");
        sub.expiration_time = Some(Utc::now() - chrono::Duration::minutes(1));
        platform.set_subscription(Some(sub));

        let state = raw.refresh().await;
        assert!(!state.subscribed);
    }

    #[tokio::test]
    async fn test_waiting_worker_still_counts_as_registered() {
        let server = vapid_server().await;
        let platform = Arc::new(MemoryPushPlatform::new());
        platform.set_new_worker_state(WorkerState::Waiting);
        let raw = provider(&platform, &server);

        assert!(raw.initialize().await);
        let registration = raw
            .worker_registration()
            .await
            .expect("probe")
            .expect("registered");
        assert!(!registration.is_active());
    }
}
