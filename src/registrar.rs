//! Subscription registrar: tells the authority about local subscriptions.
//!
//! Registration is best-effort. A provider that subscribed locally counts as
//! subscribed for the user even when the authority call fails; the next
//! health tick or recovery pass gets another chance to register it.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::authority::{Authority, SubscribeRequest, UnsubscribeRequest};
use crate::device::DeviceRegistry;
use crate::platform::Permission;
use crate::provider::{ProviderKind, PushProvider, SubscriptionHandle};

/// Outcome of one provider's part in a subscribe or unsubscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderOutcome {
    /// The provider holds a local subscription afterwards (subscribe) or
    /// revoked it cleanly (unsubscribe).
    pub subscribed: bool,
    /// The authority acknowledged the (de)registration.
    pub registered: bool,
    /// Why the provider did not succeed, when known.
    pub reason: Option<String>,
}

impl ProviderOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            subscribed: false,
            registered: false,
            reason: Some(reason.into()),
        }
    }
}

/// Combined result of subscribing both providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscribeOutcome {
    /// SDK provider.
    pub sdk: ProviderOutcome,
    /// Raw Web Push provider.
    pub raw: ProviderOutcome,
}

impl SubscribeOutcome {
    /// User-facing result: at least one provider subscribed.
    pub fn subscribed(&self) -> bool {
        self.sdk.subscribed || self.raw.subscribed
    }

    /// Exactly one provider subscribed.
    pub fn partial(&self) -> bool {
        self.sdk.subscribed != self.raw.subscribed
    }

    /// Outcome for one provider.
    pub fn get(&self, kind: ProviderKind) -> &ProviderOutcome {
        match kind {
            ProviderKind::Sdk => &self.sdk,
            ProviderKind::Raw => &self.raw,
        }
    }

    /// Human-readable message for the UI layer.
    pub fn summary(&self) -> String {
        match (self.sdk.subscribed, self.raw.subscribed) {
            (true, true) => "Subscribed to push notifications".to_string(),
            (true, false) => format!(
                "Subscribed via sdk only (raw: {})",
                self.raw.reason.as_deref().unwrap_or("unavailable")
            ),
            (false, true) => format!(
                "Subscribed via raw only (sdk: {})",
                self.sdk.reason.as_deref().unwrap_or("unavailable")
            ),
            (false, false) => {
                let denied = [&self.sdk, &self.raw]
                    .iter()
                    .any(|o| o.reason.as_deref() == Some(REASON_DENIED));
                if denied {
                    "Notifications are blocked; allow them in browser settings".to_string()
                } else {
                    "Could not subscribe to push notifications".to_string()
                }
            }
        }
    }
}

/// Combined result of unsubscribing both providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnsubscribeOutcome {
    /// Both providers revoked cleanly.
    pub revoked: bool,
    /// The authority acknowledged the deregistration.
    pub deregistered: bool,
}

impl UnsubscribeOutcome {
    /// Human-readable message for the UI layer.
    pub fn summary(&self) -> String {
        match (self.revoked, self.deregistered) {
            (true, true) => "Unsubscribed from push notifications".to_string(),
            (true, false) => "Unsubscribed locally; server will catch up".to_string(),
            (false, _) => "Unsubscribed, but the browser reported an error".to_string(),
        }
    }
}

const REASON_DENIED: &str = "permission denied";

/// Pushes provider handles and device identity to the authority.
pub struct SubscriptionRegistrar {
    authority: Arc<dyn Authority>,
    device: Arc<DeviceRegistry>,
}

impl std::fmt::Debug for SubscriptionRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistrar")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistrar {
    /// Create a registrar.
    pub fn new(authority: Arc<dyn Authority>, device: Arc<DeviceRegistry>) -> Self {
        Self { authority, device }
    }

    /// Register one provider's handle. Returns whether the authority accepted.
    pub async fn register_with_authority(
        &self,
        kind: ProviderKind,
        handle: &SubscriptionHandle,
        device_id: &str,
    ) -> bool {
        let request = SubscribeRequest {
            provider: kind,
            handle: handle.clone(),
            device_id: device_id.to_string(),
            device_info: self.device.fingerprint(),
            last_verified: Utc::now(),
        };
        match self.authority.subscribe(&request).await {
            Ok(_) => {
                log::info!("[Registrar] Registered {kind} subscription for {device_id}");
                true
            }
            Err(e) => {
                log::warn!("[Registrar] Failed to register {kind} subscription: {e}");
                false
            }
        }
    }

    /// Tell the authority this device dropped one provider, or all of them.
    pub async fn deregister_with_authority(&self, kind: Option<ProviderKind>) -> bool {
        let request = UnsubscribeRequest {
            device_id: self.device.get_device_id(),
            provider: kind,
        };
        match self.authority.unsubscribe(&request).await {
            Ok(_) => {
                log::info!("[Registrar] Deregistered device {}", request.device_id);
                true
            }
            Err(e) => {
                log::warn!("[Registrar] Failed to deregister: {e}");
                false
            }
        }
    }

    /// Subscribe both providers concurrently and register whichever succeeded.
    pub async fn subscribe_all(
        &self,
        sdk: &dyn PushProvider,
        raw: &dyn PushProvider,
    ) -> SubscribeOutcome {
        let device_id = self.device.get_device_id();
        let (sdk_outcome, raw_outcome) = tokio::join!(
            self.subscribe_one(sdk, &device_id),
            self.subscribe_one(raw, &device_id),
        );
        let outcome = SubscribeOutcome {
            sdk: sdk_outcome,
            raw: raw_outcome,
        };
        if outcome.partial() {
            log::info!("[Registrar] {}", outcome.summary());
        }
        outcome
    }

    /// Unsubscribe both providers concurrently, then deregister the device.
    pub async fn unsubscribe_all(
        &self,
        sdk: &dyn PushProvider,
        raw: &dyn PushProvider,
    ) -> UnsubscribeOutcome {
        let (sdk_ok, raw_ok) = tokio::join!(sdk.unsubscribe(), raw.unsubscribe());
        let deregistered = self.deregister_with_authority(None).await;
        UnsubscribeOutcome {
            revoked: sdk_ok && raw_ok,
            deregistered,
        }
    }

    async fn subscribe_one(&self, provider: &dyn PushProvider, device_id: &str) -> ProviderOutcome {
        let kind = provider.kind();
        if !provider.subscribe().await {
            let state = provider.state();
            let reason = if !state.supported {
                "not supported on this platform"
            } else if provider.permission_state() == Permission::Denied {
                REASON_DENIED
            } else if !state.initialized {
                "provider unavailable"
            } else {
                "subscribe failed"
            };
            log::debug!("[Registrar] {kind} did not subscribe: {reason}");
            return ProviderOutcome::failed(reason);
        }

        let Some(handle) = provider.subscription_handle() else {
            return ProviderOutcome {
                subscribed: true,
                registered: false,
                reason: Some("no subscription handle".to_string()),
            };
        };
        let registered = self.register_with_authority(kind, &handle, device_id).await;
        ProviderOutcome {
            subscribed: true,
            registered,
            reason: (!registered).then(|| "server registration pending".to_string()),
        }
    }
}
