//! Push providers: one adapter per delivery mechanism.
//!
//! Both adapters implement [`PushProvider`], so the registrar, reconciler
//! and service treat them uniformly:
//!
//! - [`sdk::SdkProvider`] wraps the third-party push SDK, loaded from an
//!   external script through [`loader::ExternalRuntimeLoader`].
//! - [`raw::RawPushProvider`] wraps the browser's service worker and
//!   `PushManager` with a VAPID application server key.
//!
//! Provider state is a cache of the runtime. It is rebuilt from the runtime
//! by [`PushProvider::refresh`] and never persisted.

pub mod loader;
pub mod raw;
pub mod sdk;
pub mod vapid;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::platform::{Permission, PushSubscription};

pub use raw::RawPushProvider;
pub use sdk::SdkProvider;

/// Which delivery mechanism a provider wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Third-party push SDK.
    Sdk,
    /// Raw Web Push / VAPID.
    Raw,
}

impl ProviderKind {
    /// Returns the string representation used in the API payload.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::Raw => "raw",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque subscription credential returned by a provider once subscribed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SubscriptionHandle {
    /// SDK-assigned subscription id.
    Sdk {
        /// Id the SDK's backend knows this device by.
        subscription_id: String,
    },
    /// Raw Web Push subscription.
    Raw(PushSubscription),
}

impl SubscriptionHandle {
    /// Provider the handle belongs to.
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Sdk { .. } => ProviderKind::Sdk,
            Self::Raw(_) => ProviderKind::Raw,
        }
    }

    /// Push endpoint, for raw subscriptions.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Sdk { .. } => None,
            Self::Raw(sub) => Some(&sub.endpoint),
        }
    }
}

/// Cached view of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderState {
    /// The platform can run this provider at all.
    pub supported: bool,
    /// The runtime is booted.
    pub initialized: bool,
    /// The provider holds a live subscription.
    pub subscribed: bool,
    /// Notification permission as the provider sees it.
    pub permission: Permission,
    /// Current handle, when subscribed.
    pub handle: Option<SubscriptionHandle>,
}

impl ProviderState {
    /// Initial state before `initialize` ran: assumed supported until the
    /// capability check says otherwise.
    pub fn pending() -> Self {
        Self {
            supported: true,
            ..Self::default()
        }
    }

    /// Mark the provider as locally unsubscribed.
    pub(crate) fn clear_subscription(&mut self) {
        self.subscribed = false;
        self.handle = None;
    }
}

/// Uniform contract over both push delivery mechanisms.
///
/// No method returns an error: runtime failures are logged at the adapter
/// boundary and surface as `false` / `None`. Permission denial is a normal
/// `false` outcome.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Which mechanism this is.
    fn kind(&self) -> ProviderKind;

    /// Boot the runtime. Idempotent: returns `true` immediately when already
    /// initialized and the capability probe still passes. Returns `false`
    /// permanently on an unsupported platform.
    async fn initialize(&self) -> bool;

    /// Current notification permission.
    fn permission_state(&self) -> Permission;

    /// Obtain a subscription, prompting for permission if needed.
    async fn subscribe(&self) -> bool;

    /// Revoke the subscription. Local state ends unsubscribed even when the
    /// runtime call fails.
    async fn unsubscribe(&self) -> bool;

    /// Current handle, if subscribed.
    fn subscription_handle(&self) -> Option<SubscriptionHandle>;

    /// Snapshot of the cached state.
    fn state(&self) -> ProviderState;

    /// Rebuild the cached state from the runtime.
    async fn refresh(&self) -> ProviderState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SubscriptionKeys;

    #[test]
    fn test_handle_serialization_is_tagged() {
        let sdk = SubscriptionHandle::Sdk {
            subscription_id: "abc".to_string(),
        };
        let json = serde_json::to_value(&sdk).expect("serialize");
        assert_eq!(json["provider"], "sdk");
        assert_eq!(json["subscription_id"], "abc");

        let raw = SubscriptionHandle::Raw(PushSubscription {
            endpoint: "https://push.example.com/x".to_string(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: "k".to_string(),
                auth: "a".to_string(),
            },
        });
        let json = serde_json::to_value(&raw).expect("serialize");
        assert_eq!(json["provider"], "raw");
        assert_eq!(json["endpoint"], "https://push.example.com/x");
        assert_eq!(json["keys"]["auth"], "a");

        let back: SubscriptionHandle = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.kind(), ProviderKind::Raw);
        assert_eq!(back.endpoint(), Some("https://push.example.com/x"));
    }

    #[test]
    fn test_pending_state() {
        let state = ProviderState::pending();
        assert!(state.supported);
        assert!(!state.initialized);
        assert!(!state.subscribed);
        assert_eq!(state.permission, Permission::Default);
    }
}
