//! Status reconciliation between provider caches and the authority.
//!
//! Local provider state is a cache. The authority's answer overrides it per
//! provider; when the authority cannot be reached the local view is returned
//! marked as [`StatusSource::LocalFallback`] so callers never mistake it for
//! a confirmed subscription.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::authority::{Authority, ProviderFlags};
use crate::lock;
use crate::provider::PushProvider;

/// Where a reconciled status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// Confirmed by the authority.
    Remote,
    /// Authority unreachable; local provider caches only.
    LocalFallback,
}

/// Subscription status after merging local and remote views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledStatus {
    /// Per-provider flags.
    pub flags: ProviderFlags,
    /// Whether the device counts as subscribed.
    pub is_subscribed: bool,
    /// Devices the authority knows for this user; 0 on fallback.
    pub total_devices: u64,
    /// Origin of this answer.
    pub source: StatusSource,
}

impl ReconciledStatus {
    /// Whether the authority confirmed this status.
    pub fn verified(&self) -> bool {
        self.source == StatusSource::Remote
    }
}

/// Synchronous status snapshot for the UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// At least one provider can run here.
    pub is_supported: bool,
    /// At least one provider is subscribed.
    pub is_subscribed: bool,
    /// SDK provider subscribed.
    pub sdk: bool,
    /// Raw Web Push provider subscribed.
    pub raw: bool,
    /// Notification permission is granted.
    pub has_permission: bool,
    /// The flags come from the authority rather than local caches.
    pub verified: bool,
}

impl SubscriptionStatus {
    /// Notifications can be assumed deliverable: subscribed and confirmed
    /// by the authority.
    pub fn is_deliverable(&self) -> bool {
        self.is_subscribed && self.verified
    }
}

/// Merges provider caches with the authority's record.
pub struct StatusReconciler {
    authority: Arc<dyn Authority>,
    sdk: Arc<dyn PushProvider>,
    raw: Arc<dyn PushProvider>,
    last: Mutex<Option<ReconciledStatus>>,
}

impl std::fmt::Debug for StatusReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReconciler")
            .field("last", &*lock(&self.last))
            .finish_non_exhaustive()
    }
}

impl StatusReconciler {
    /// Create a reconciler over both providers.
    pub fn new(
        authority: Arc<dyn Authority>,
        sdk: Arc<dyn PushProvider>,
        raw: Arc<dyn PushProvider>,
    ) -> Self {
        Self {
            authority,
            sdk,
            raw,
            last: Mutex::new(None),
        }
    }

    /// Cached subscription flags of both providers.
    pub fn local_status(&self) -> ProviderFlags {
        ProviderFlags {
            sdk: self.sdk.state().subscribed,
            raw: self.raw.state().subscribed,
        }
    }

    /// Ask the authority; fall back to local flags when it is unreachable.
    pub async fn authoritative_status(&self) -> ReconciledStatus {
        let status = match self.authority.subscription_status().await {
            Ok(remote) => {
                let local = self.local_status();
                let flags = if remote.is_subscribed {
                    remote.subscriptions
                } else {
                    ProviderFlags::default()
                };
                if flags != local {
                    log::info!(
                        "[Reconcile] Authority disagrees with local state \
                         (local sdk={} raw={}, remote sdk={} raw={})",
                        local.sdk,
                        local.raw,
                        flags.sdk,
                        flags.raw
                    );
                }
                ReconciledStatus {
                    flags,
                    is_subscribed: remote.is_subscribed,
                    total_devices: remote.details.total_devices,
                    source: StatusSource::Remote,
                }
            }
            Err(e) => {
                log::warn!("[Reconcile] Using local status, authority unavailable: {e}");
                let flags = self.local_status();
                ReconciledStatus {
                    flags,
                    is_subscribed: flags.any(),
                    total_devices: 0,
                    source: StatusSource::LocalFallback,
                }
            }
        };
        *lock(&self.last) = Some(status.clone());
        status
    }

    /// Last reconciled status, if any.
    pub fn last(&self) -> Option<ReconciledStatus> {
        lock(&self.last).clone()
    }

    /// Forget the last remote answer so the snapshot turns optimistic-local.
    pub fn invalidate(&self) {
        *lock(&self.last) = None;
    }

    /// Synchronous snapshot: the last reconciled flags, or local flags
    /// (unverified) before the first remote answer.
    pub fn snapshot(&self) -> SubscriptionStatus {
        let sdk = self.sdk.state();
        let raw = self.raw.state();
        let is_supported = sdk.supported || raw.supported;
        let has_permission =
            self.sdk.permission_state().is_granted() || self.raw.permission_state().is_granted();

        let (flags, is_subscribed, verified) = match self.last() {
            Some(status) => (status.flags, status.is_subscribed, status.verified()),
            None => {
                let flags = self.local_status();
                (flags, flags.any(), false)
            }
        };

        SubscriptionStatus {
            is_supported,
            is_subscribed,
            sdk: flags.sdk,
            raw: flags.raw,
            has_permission,
            verified,
        }
    }
}
