//! Recovery of the raw Web Push path after a failed liveness check.
//!
//! Each step is skipped when its precondition already holds:
//!
//! 1. Re-register the service worker when it is missing or not active.
//! 2. Re-subscribe when the subscription is missing or expired, but only if
//!    the user still wants one and permission is already granted. Recovery
//!    never shows a prompt and never undoes an unsubscribe.
//! 3. Push the current handle to the authority when the authority does not
//!    list this device's raw subscription (or the endpoint just changed).
//!
//! At most one recovery runs at a time; an overlapping call is a no-op.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::DeviceRegistry;
use crate::provider::{ProviderKind, PushProvider, RawPushProvider};
use crate::reconcile::StatusReconciler;
use crate::registrar::SubscriptionRegistrar;

/// Re-entrancy guarded repair sequence.
pub struct RecoveryCoordinator {
    raw: Arc<RawPushProvider>,
    registrar: Arc<SubscriptionRegistrar>,
    reconciler: Arc<StatusReconciler>,
    device: Arc<DeviceRegistry>,
    running: AtomicBool,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// What the subscription step did.
enum SubscriptionRepair {
    Intact,
    OptedOut,
    Replaced,
    Blocked,
    Failed,
}

impl RecoveryCoordinator {
    /// Create a coordinator for the raw provider.
    pub fn new(
        raw: Arc<RawPushProvider>,
        registrar: Arc<SubscriptionRegistrar>,
        reconciler: Arc<StatusReconciler>,
        device: Arc<DeviceRegistry>,
    ) -> Self {
        Self {
            raw,
            registrar,
            reconciler,
            device,
            running: AtomicBool::new(false),
        }
    }

    /// Whether a recovery is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the repair sequence.
    ///
    /// Returns `false` immediately when another recovery is in flight.
    /// Otherwise returns `true` when every attempted step succeeded, and
    /// `false` when a step failed or missing permission blocked the repair.
    /// Step errors are logged, never propagated.
    pub async fn recover(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("[Recovery] Already in progress, skipping");
            return false;
        }
        scopeguard::defer! {
            self.running.store(false, Ordering::SeqCst);
        }

        log::info!("[Recovery] Starting recovery");
        let mut ok = self.repair_worker().await;

        let resubscribed = match self.repair_subscription().await {
            SubscriptionRepair::Intact => false,
            SubscriptionRepair::OptedOut => {
                log::info!("[Recovery] Device opted out, subscription left alone");
                return ok;
            }
            SubscriptionRepair::Replaced => true,
            SubscriptionRepair::Blocked => {
                log::info!("[Recovery] Stopped: notification permission not granted");
                return false;
            }
            SubscriptionRepair::Failed => {
                ok = false;
                false
            }
        };

        if !self.repair_registration(resubscribed).await {
            ok = false;
        }

        if ok {
            log::info!("[Recovery] Completed");
        } else {
            log::warn!("[Recovery] Completed with failures");
        }
        ok
    }

    async fn repair_worker(&self) -> bool {
        match self.raw.worker_registration().await {
            Ok(Some(registration)) if registration.is_active() => return true,
            Ok(Some(registration)) => {
                log::info!(
                    "[Recovery] Service worker is {:?}, re-registering",
                    registration.state
                );
            }
            Ok(None) => log::info!("[Recovery] Service worker missing, re-registering"),
            Err(e) => log::warn!("[Recovery] Could not read service worker: {e}"),
        }

        match self.raw.reregister_worker().await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("[Recovery] Service worker re-registration failed: {e}");
                false
            }
        }
    }

    async fn repair_subscription(&self) -> SubscriptionRepair {
        if !self.raw.wants_subscription() {
            return SubscriptionRepair::OptedOut;
        }
        match self.raw.current_subscription().await {
            Ok(Some(sub)) if !sub.is_expired(Utc::now()) => return SubscriptionRepair::Intact,
            Ok(Some(_)) => log::info!("[Recovery] Subscription expired"),
            Ok(None) => log::info!("[Recovery] Subscription missing"),
            Err(e) => log::warn!("[Recovery] Could not read subscription: {e}"),
        }

        if !self.raw.permission_state().is_granted() {
            return SubscriptionRepair::Blocked;
        }

        match self.raw.resubscribe_silently().await {
            Ok(true) => SubscriptionRepair::Replaced,
            Ok(false) => SubscriptionRepair::Blocked,
            Err(e) => {
                log::warn!("[Recovery] Re-subscribe failed: {e}");
                SubscriptionRepair::Failed
            }
        }
    }

    async fn repair_registration(&self, endpoint_changed: bool) -> bool {
        if !endpoint_changed {
            let status = self.reconciler.authoritative_status().await;
            if !status.verified() {
                log::warn!("[Recovery] Authority unavailable, registration not verified");
                return false;
            }
            if status.flags.raw {
                return true;
            }
        }

        let handle = match self.raw.subscription_handle() {
            Some(handle) => Some(handle),
            None => self.raw.refresh().await.handle,
        };
        let Some(handle) = handle else {
            log::debug!("[Recovery] No raw handle to register");
            return true;
        };
        let device_id = self.device.get_device_id();
        if !self
            .registrar
            .register_with_authority(ProviderKind::Raw, &handle, &device_id)
            .await
        {
            return false;
        }
        self.reconciler.authoritative_status().await;
        true
    }
}
