//! Runtime seams for the two push delivery mechanisms.
//!
//! The engine never talks to a browser directly. It drives two traits:
//!
//! ```text
//! PushPlatform (raw Web Push)          SdkRuntime (third-party SDK)
//!     │                                    │
//!     ├── service worker container         ├── script tag + global object
//!     ├── PushManager                      ├── version probe → SdkCapabilities
//!     └── Notification permission          └── opt-in / opt-out
//! ```
//!
//! Browser builds implement these over `web-sys` handles; [`memory`] holds
//! scripted in-process implementations used by tests and the `simulate`
//! command.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// User allowed notifications.
    Granted,
    /// User blocked notifications.
    Denied,
    /// Not asked yet.
    #[default]
    Default,
}

impl Permission {
    /// Returns the string representation used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        }
    }

    /// Whether notifications are allowed.
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browser capabilities relevant to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformCapabilities {
    /// `navigator.serviceWorker` exists.
    pub service_worker: bool,
    /// `PushManager` exists.
    pub push_manager: bool,
    /// `Notification` exists.
    pub notifications: bool,
}

impl PlatformCapabilities {
    /// Everything present.
    pub fn full() -> Self {
        Self {
            service_worker: true,
            push_manager: true,
            notifications: true,
        }
    }

    /// Whether push can work at all on this platform.
    pub fn supports_push(self) -> bool {
        self.service_worker && self.push_manager
    }
}

/// Lifecycle state of a service worker registration's newest worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Installing, not yet controlling.
    Installing,
    /// Installed, waiting to activate.
    Waiting,
    /// Active and able to receive push events.
    Active,
    /// Replaced or failed.
    Redundant,
}

/// A service worker registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRegistration {
    /// Registration scope.
    pub scope: String,
    /// Script URL of the worker.
    pub script_url: String,
    /// State of the newest worker.
    pub state: WorkerState,
}

impl WorkerRegistration {
    /// Whether the worker is active (not merely installing or waiting).
    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Active
    }
}

/// Keys of a Web Push subscription (RFC 8291).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

/// A browser's raw Web Push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Expiration reported by the push service, if any.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub expiration_time: Option<DateTime<Utc>>,
    /// Encryption keys.
    pub keys: SubscriptionKeys,
}

impl PushSubscription {
    /// Whether the subscription has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.is_some_and(|exp| exp <= now)
    }

    /// Whether the subscription expires within `window` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return false;
        };
        self.expiration_time
            .is_some_and(|exp| exp > now && exp - now <= window)
    }
}

/// Capability descriptor returned by the SDK version probe.
///
/// Checked once after load and cached; initialization and subscribe paths
/// branch on these flags instead of probing methods ad hoc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkCapabilities {
    /// Reported SDK version.
    pub version: String,
    /// The SDK exposes a push-subscription API (opt in/out, subscription id).
    pub push_subscription_api: bool,
    /// The SDK can show the native permission prompt itself.
    pub permission_api: bool,
}

/// Errors raised by a platform runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The capability is missing on this platform.
    Unsupported(String),
    /// The user refused permission.
    PermissionDenied,
    /// The runtime threw.
    Runtime(String),
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported(what) => write!(f, "Unsupported: {what}"),
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::Runtime(msg) => write!(f, "Runtime error: {msg}"),
        }
    }
}

impl std::error::Error for PlatformError {}

/// Browser Web Push runtime: service worker container, PushManager and the
/// Notification permission.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// Report which capabilities exist.
    fn capabilities(&self) -> PlatformCapabilities;

    /// Current notification permission.
    fn permission(&self) -> Permission;

    /// Show the permission prompt.
    async fn request_permission(&self) -> Result<Permission, PlatformError>;

    /// Register (or update) the service worker.
    async fn register_service_worker(
        &self,
        script_url: &str,
        scope: &str,
    ) -> Result<WorkerRegistration, PlatformError>;

    /// Current service worker registration, if any.
    async fn registration(&self) -> Result<Option<WorkerRegistration>, PlatformError>;

    /// Current push subscription, if any.
    async fn subscription(&self) -> Result<Option<PushSubscription>, PlatformError>;

    /// Create a push subscription with the given application server key.
    ///
    /// Never prompts on its own; callers request permission first.
    async fn subscribe(&self, application_server_key: &[u8])
        -> Result<PushSubscription, PlatformError>;

    /// Drop the push subscription. Returns whether one existed.
    async fn unsubscribe(&self) -> Result<bool, PlatformError>;
}

/// Third-party push SDK runtime, loaded from an external script.
#[async_trait]
pub trait SdkRuntime: Send + Sync {
    /// Browser capabilities the SDK relies on.
    fn capabilities(&self) -> PlatformCapabilities;

    /// Inject the SDK script tag. Returns once the tag is in the document;
    /// the global may appear later.
    async fn inject_script(&self, url: &str) -> Result<(), PlatformError>;

    /// Whether the SDK global is present.
    fn is_available(&self) -> bool;

    /// Version detection. `None` means the SDK is present but not functional.
    fn probe(&self) -> Option<SdkCapabilities>;

    /// Initialize the SDK with the deployment's app id.
    async fn init(&self, app_id: &str) -> Result<(), PlatformError>;

    /// Permission as seen by the SDK.
    fn permission(&self) -> Permission;

    /// Show the permission prompt through the SDK.
    async fn request_permission(&self) -> Result<Permission, PlatformError>;

    /// Opt this device into push.
    async fn opt_in(&self) -> Result<(), PlatformError>;

    /// Opt this device out of push.
    async fn opt_out(&self) -> Result<(), PlatformError>;

    /// SDK-assigned subscription id, once opted in.
    fn subscription_id(&self) -> Option<String>;

    /// Whether the SDK considers this device opted in.
    fn opted_in(&self) -> bool;
}
