//! Session-scoped facade over the whole engine.
//!
//! One [`PushService`] is built per authenticated session with
//! [`PushService::builder`] and passed by reference to whatever needs it.
//! Lifecycle is explicit: [`PushService::initialize`] boots the providers,
//! reconciles with the authority and starts monitoring;
//! [`PushService::dispose`] stops monitoring (also done on drop).
//!
//! # Example
//!
//! ```ignore
//! let service = PushService::builder()
//!     .config(Config::load()?)
//!     .store(Arc::new(FileStore::in_config_dir()?))
//!     .push_platform(platform)
//!     .sdk_runtime(sdk)
//!     .build()?;
//! service.initialize().await?;
//! let outcome = service.subscribe().await;
//! println!("{}", outcome.summary());
//! ```

use std::sync::Arc;

use crate::authority::{
    Authority, AuthorityClient, DeliveryReport, NotificationRequest, PushStats,
};
use crate::config::Config;
use crate::device::{DeviceFingerprint, DeviceRegistry, FingerprintSource, NativeFingerprint};
use crate::error::PushError;
use crate::health::{HealthMonitor, HealthSchedule};
use crate::platform::{PushPlatform, SdkRuntime};
use crate::provider::{PushProvider, RawPushProvider, SdkProvider};
use crate::reconcile::{ReconciledStatus, StatusReconciler, SubscriptionStatus};
use crate::recovery::RecoveryCoordinator;
use crate::registrar::{SubscribeOutcome, SubscriptionRegistrar, UnsubscribeOutcome};
use crate::storage::{KeyValueStore, MemoryStore};

/// Builder for [`PushService`].
#[derive(Default)]
pub struct PushServiceBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn KeyValueStore>>,
    fingerprint: Option<Box<dyn FingerprintSource>>,
    authority: Option<Arc<dyn Authority>>,
    platform: Option<Arc<dyn PushPlatform>>,
    sdk_runtime: Option<Arc<dyn SdkRuntime>>,
    schedule: Option<HealthSchedule>,
}

impl std::fmt::Debug for PushServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushServiceBuilder")
            .field("config", &self.config)
            .field("custom_authority", &self.authority.is_some())
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl PushServiceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration; defaults to [`Config::default`].
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Durable storage for the device id and bearer token.
    ///
    /// Defaults to an in-memory store, which gives a new device id per run.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fingerprint source; defaults to [`NativeFingerprint`].
    #[must_use]
    pub fn fingerprint(mut self, source: Box<dyn FingerprintSource>) -> Self {
        self.fingerprint = Some(source);
        self
    }

    /// Authority implementation; defaults to an [`AuthorityClient`] built
    /// from the configuration.
    #[must_use]
    pub fn authority(mut self, authority: Arc<dyn Authority>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Raw Web Push runtime (required).
    #[must_use]
    pub fn push_platform(mut self, platform: Arc<dyn PushPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Third-party SDK runtime (required).
    #[must_use]
    pub fn sdk_runtime(mut self, runtime: Arc<dyn SdkRuntime>) -> Self {
        self.sdk_runtime = Some(runtime);
        self
    }

    /// Monitoring cadence; defaults to the configured intervals.
    #[must_use]
    pub fn schedule(mut self, schedule: HealthSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Assemble the service.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Config`] when a required runtime is missing or
    /// the HTTP client cannot be created.
    pub fn build(self) -> Result<PushService, PushError> {
        let platform = self
            .platform
            .ok_or_else(|| PushError::Config("push platform is required".to_string()))?;
        let sdk_runtime = self
            .sdk_runtime
            .ok_or_else(|| PushError::Config("SDK runtime is required".to_string()))?;

        let mut config = self.config.unwrap_or_default();
        let store: Arc<dyn KeyValueStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        config.resolve_token(store.as_ref());

        let authority: Arc<dyn Authority> = match self.authority {
            Some(authority) => authority,
            None => Arc::new(AuthorityClient::from_config(&config)?),
        };
        let schedule = self
            .schedule
            .unwrap_or_else(|| HealthSchedule::from_config(&config));

        let device = Arc::new(DeviceRegistry::new(
            store,
            self.fingerprint.unwrap_or_else(|| Box::new(NativeFingerprint)),
        ));
        let sdk = Arc::new(SdkProvider::new(
            sdk_runtime,
            &config.sdk_app_id,
            &config.sdk_script_url,
        ));
        let raw = Arc::new(RawPushProvider::new(
            platform,
            Arc::clone(&authority),
            &config.service_worker_path,
        ));
        let registrar = Arc::new(SubscriptionRegistrar::new(
            Arc::clone(&authority),
            Arc::clone(&device),
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            Arc::clone(&authority),
            Arc::clone(&sdk) as Arc<dyn PushProvider>,
            Arc::clone(&raw) as Arc<dyn PushProvider>,
        ));
        let recovery = Arc::new(RecoveryCoordinator::new(
            Arc::clone(&raw),
            Arc::clone(&registrar),
            Arc::clone(&reconciler),
            Arc::clone(&device),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&raw),
            Arc::clone(&authority),
            Arc::clone(&device),
            Arc::clone(&recovery),
            schedule,
        ));

        Ok(PushService {
            device,
            authority,
            sdk,
            raw,
            registrar,
            reconciler,
            recovery,
            monitor,
        })
    }
}

/// Push subscription lifecycle for one session.
pub struct PushService {
    device: Arc<DeviceRegistry>,
    authority: Arc<dyn Authority>,
    sdk: Arc<SdkProvider>,
    raw: Arc<RawPushProvider>,
    registrar: Arc<SubscriptionRegistrar>,
    reconciler: Arc<StatusReconciler>,
    recovery: Arc<RecoveryCoordinator>,
    monitor: Arc<HealthMonitor>,
}

impl std::fmt::Debug for PushService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushService")
            .field("sdk", &self.sdk)
            .field("raw", &self.raw)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl PushService {
    /// Create a new service builder.
    #[must_use]
    pub fn builder() -> PushServiceBuilder {
        PushServiceBuilder::new()
    }

    /// Boot both providers, reconcile with the authority and start
    /// monitoring. Safe to call again; monitoring is restarted, not doubled.
    ///
    /// Returns whether at least one provider is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::UnsupportedPlatform`] when neither provider can
    /// run here.
    pub async fn initialize(&self) -> Result<bool, PushError> {
        let device_id = self.device.get_device_id();
        log::info!("Initializing push service for device {device_id}");

        let (sdk_ok, raw_ok) = tokio::join!(self.sdk.initialize(), self.raw.initialize());
        if !self.sdk.state().supported && !self.raw.state().supported {
            log::warn!("Push notifications unsupported on this platform");
            return Err(PushError::UnsupportedPlatform);
        }

        tokio::join!(self.sdk.refresh(), self.raw.refresh());
        let status = self.reconciler.authoritative_status().await;
        log::info!(
            "Push status: subscribed={} sdk={} raw={} ({:?})",
            status.is_subscribed,
            status.flags.sdk,
            status.flags.raw,
            status.source
        );

        if raw_ok {
            self.monitor.start();
        } else {
            self.monitor.stop();
        }
        Ok(sdk_ok || raw_ok)
    }

    /// Subscribe through both providers at once.
    ///
    /// The outcome counts as subscribed when at least one provider succeeded;
    /// [`SubscribeOutcome::summary`] carries the user-facing message.
    pub async fn subscribe(&self) -> SubscribeOutcome {
        let outcome = self
            .registrar
            .subscribe_all(self.sdk.as_ref(), self.raw.as_ref())
            .await;
        self.reconciler.invalidate();
        self.reconciler.authoritative_status().await;
        outcome
    }

    /// Unsubscribe both providers and deregister the device.
    pub async fn unsubscribe(&self) -> UnsubscribeOutcome {
        let outcome = self
            .registrar
            .unsubscribe_all(self.sdk.as_ref(), self.raw.as_ref())
            .await;
        self.reconciler.invalidate();
        self.reconciler.authoritative_status().await;
        outcome
    }

    /// Synchronous snapshot of the last known status.
    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.reconciler.snapshot()
    }

    /// Rebuild provider state and ask the authority again.
    pub async fn refresh_status(&self) -> ReconciledStatus {
        tokio::join!(self.sdk.refresh(), self.raw.refresh());
        self.reconciler.authoritative_status().await
    }

    /// Ask the authority to send a test notification to the current user.
    pub async fn send_test_notification(&self) -> Result<DeliveryReport, PushError> {
        Ok(self.authority.send_test().await?)
    }

    /// Send a notification to one user.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<DeliveryReport, PushError> {
        let mut request = NotificationRequest::new(title, body, data);
        request.user_id = Some(user_id.to_string());
        Ok(self.authority.send_to_user(&request).await?)
    }

    /// Send a notification to every user holding `role`.
    pub async fn send_to_role(
        &self,
        role: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<DeliveryReport, PushError> {
        let mut request = NotificationRequest::new(title, body, data);
        request.role = Some(role.to_string());
        Ok(self.authority.send_to_role(&request).await?)
    }

    /// Send a notification to everyone.
    pub async fn broadcast(
        &self,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<DeliveryReport, PushError> {
        let request = NotificationRequest::new(title, body, data);
        Ok(self.authority.broadcast(&request).await?)
    }

    /// Aggregate subscription counts.
    pub async fn stats(&self) -> Result<PushStats, PushError> {
        Ok(self.authority.stats().await?)
    }

    /// Run the recovery sequence now.
    pub async fn recover(&self) -> bool {
        self.recovery.recover().await
    }

    /// Stop monitoring. The service can be initialized again afterwards.
    pub fn dispose(&self) {
        self.monitor.stop();
    }

    /// This device's id.
    pub fn device_id(&self) -> String {
        self.device.get_device_id()
    }

    /// This device's fingerprint.
    pub fn device_info(&self) -> DeviceFingerprint {
        self.device.fingerprint()
    }

    /// Health monitor, for one-off checks and heartbeats.
    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// SDK provider.
    pub fn sdk(&self) -> &SdkProvider {
        &self.sdk
    }

    /// Raw Web Push provider.
    pub fn raw(&self) -> &RawPushProvider {
        &self.raw
    }
}

impl Drop for PushService {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}
