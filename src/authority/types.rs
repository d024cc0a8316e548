//! Request and response types for the authority API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::device::DeviceFingerprint;
use crate::provider::{ProviderKind, SubscriptionHandle};

/// Per-provider subscription flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFlags {
    /// Third-party SDK provider.
    #[serde(default)]
    pub sdk: bool,
    /// Raw Web Push provider.
    #[serde(default)]
    pub raw: bool,
}

impl ProviderFlags {
    /// Flag for one provider.
    pub fn get(self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Sdk => self.sdk,
            ProviderKind::Raw => self.raw,
        }
    }

    /// Whether any provider is subscribed.
    pub fn any(self) -> bool {
        self.sdk || self.raw
    }
}

/// Server-side details about the account's subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    /// Devices registered for the current user.
    #[serde(default)]
    pub total_devices: u64,
    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Response of `GET /subscription-status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStatusResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Whether this device is subscribed through any provider.
    #[serde(default)]
    pub is_subscribed: bool,
    /// Per-provider flags.
    #[serde(default)]
    pub subscriptions: ProviderFlags,
    /// Extra details.
    #[serde(default)]
    pub details: SubscriptionDetails,
}

/// Body of `POST /subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Provider the handle belongs to.
    pub provider: ProviderKind,
    /// Opaque subscription handle.
    pub handle: SubscriptionHandle,
    /// Stable device id.
    pub device_id: String,
    /// Fingerprint snapshot.
    pub device_info: DeviceFingerprint,
    /// When the handle was last verified locally.
    pub last_verified: DateTime<Utc>,
}

/// Body of `POST /unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    /// Stable device id.
    pub device_id: String,
    /// Limit to one provider; `None` means all of this device's subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
}

/// Body of `POST /heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Stable device id.
    pub device_id: String,
    /// Current push endpoint, if subscribed.
    pub endpoint: Option<String>,
    /// Fingerprint snapshot.
    pub device_info: DeviceFingerprint,
    /// Client time of the beat.
    pub timestamp: DateTime<Utc>,
    /// Whether the local subscription looked valid.
    pub subscription_valid: bool,
}

/// Generic `{ success }` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    /// Whether the authority accepted the call.
    #[serde(default)]
    pub success: bool,
    /// Optional explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response of `GET /vapid/public-key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidKeyResponse {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Base64url application server key.
    #[serde(rename = "publicKey", default)]
    pub public_key: String,
}

/// Body of the send endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Arbitrary payload delivered with the notification.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Target user (send-to-user only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Target role (send-to-role only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl NotificationRequest {
    /// Notification without a target (broadcast / self-test).
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
            user_id: None,
            role: None,
        }
    }
}

/// Result of a send call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Whether the authority accepted the send.
    #[serde(default)]
    pub success: bool,
    /// Deliveries that went out.
    #[serde(default)]
    pub sent: u64,
    /// Deliveries that failed.
    #[serde(default)]
    pub failed: u64,
    /// Optional explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response of `GET /stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushStats {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Subscriptions across all users.
    #[serde(default)]
    pub total_subscriptions: u64,
    /// Devices seen recently.
    #[serde(default)]
    pub active_devices: u64,
    /// Subscription counts per provider.
    #[serde(default)]
    pub by_provider: BTreeMap<String, u64>,
    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_tolerates_missing_fields() {
        let status: SubscriptionStatusResponse =
            serde_json::from_str(r#"{"success": true, "is_subscribed": false}"#).expect("parse");
        assert!(status.success);
        assert_eq!(status.subscriptions, ProviderFlags::default());
        assert_eq!(status.details.total_devices, 0);
    }

    #[test]
    fn test_status_details_keep_extra_fields() {
        let status: SubscriptionStatusResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "is_subscribed": true,
            "subscriptions": {"sdk": false, "raw": true},
            "details": {"total_devices": 3, "last_seen": "2026-01-01T00:00:00Z"}
        }))
        .expect("parse");
        assert!(status.subscriptions.get(ProviderKind::Raw));
        assert!(!status.subscriptions.get(ProviderKind::Sdk));
        assert_eq!(status.details.total_devices, 3);
        assert!(status.details.extra.contains_key("last_seen"));
    }

    #[test]
    fn test_vapid_key_wire_name() {
        let key: VapidKeyResponse =
            serde_json::from_str(r#"{"success": true, "publicKey": "BAAA"}"#).expect("parse");
        assert_eq!(key.public_key, "BAAA");
    }

    #[test]
    fn test_notification_request_omits_empty_targets() {
        let json = serde_json::to_value(NotificationRequest::new(
            "Hi",
            "There",
            serde_json::json!({"url": "/"}),
        ))
        .expect("serialize");
        assert!(json.get("user_id").is_none());
        assert!(json.get("role").is_none());
        assert_eq!(json["data"]["url"], "/");
    }
}
