//! Health monitoring of the raw Web Push path.
//!
//! Two independent loops run while a session is active:
//!
//! - **Liveness** (every `check_interval`): the service worker must be
//!   registered and active, the subscription must exist and be unexpired.
//!   A failed check spawns [`RecoveryCoordinator::recover`] unless one is
//!   already running.
//! - **Heartbeat** (first beat after `initial_heartbeat_delay`, then every
//!   `heartbeat_interval`): refreshes the authority's last-seen record.
//!   A failed heartbeat is logged only.
//!
//! Both loops share one [`CancellationToken`]; [`HealthMonitor::start`]
//! cancels the previous pair before spawning a new one.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::authority::{Authority, HeartbeatRequest};
use crate::config::Config;
use crate::constants;
use crate::device::DeviceRegistry;
use crate::lock;
use crate::provider::{PushProvider, RawPushProvider};
use crate::recovery::RecoveryCoordinator;

/// Health of one monitored resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResourceHealth {
    /// Not checked yet.
    #[default]
    Unknown,
    /// Last check passed.
    Healthy,
    /// Last check failed.
    Unhealthy,
}

/// Why a liveness check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnhealthyReason {
    /// No service worker registration.
    NoServiceWorker,
    /// The worker is installing, waiting or redundant.
    WorkerNotActive,
    /// No push subscription.
    NoSubscription,
    /// The subscription's expiration time has passed.
    Expired,
    /// The platform could not be queried.
    CheckFailed(String),
}

impl std::fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoServiceWorker => write!(f, "no service worker"),
            Self::WorkerNotActive => write!(f, "service worker not active"),
            Self::NoSubscription => write!(f, "no subscription"),
            Self::Expired => write!(f, "expired"),
            Self::CheckFailed(msg) => write!(f, "check failed: {msg}"),
        }
    }
}

/// Result of one liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Whether every resource passed.
    pub healthy: bool,
    /// First failure found, when unhealthy.
    pub reason: Option<UnhealthyReason>,
}

impl HealthSnapshot {
    fn healthy() -> Self {
        Self {
            healthy: true,
            reason: None,
        }
    }

    fn unhealthy(reason: UnhealthyReason) -> Self {
        Self {
            healthy: false,
            reason: Some(reason),
        }
    }
}

/// Monitoring cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSchedule {
    /// Interval between liveness checks.
    pub check_interval: Duration,
    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,
    /// Delay before the first heartbeat.
    pub initial_heartbeat_delay: Duration,
}

impl Default for HealthSchedule {
    fn default() -> Self {
        Self {
            check_interval: constants::HEALTH_CHECK_INTERVAL,
            heartbeat_interval: constants::HEARTBEAT_INTERVAL,
            initial_heartbeat_delay: constants::INITIAL_HEARTBEAT_DELAY,
        }
    }
}

impl HealthSchedule {
    /// Cadence from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_interval: config.health_check_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            initial_heartbeat_delay: config.initial_heartbeat_delay(),
        }
    }
}

/// Liveness checks, heartbeats and recovery triggering.
pub struct HealthMonitor {
    raw: Arc<RawPushProvider>,
    authority: Arc<dyn Authority>,
    device: Arc<DeviceRegistry>,
    recovery: Arc<RecoveryCoordinator>,
    schedule: HealthSchedule,
    worker: Mutex<ResourceHealth>,
    subscription: Mutex<ResourceHealth>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("schedule", &self.schedule)
            .field("worker", &self.worker_health())
            .field("subscription", &self.subscription_health())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Create a stopped monitor.
    pub fn new(
        raw: Arc<RawPushProvider>,
        authority: Arc<dyn Authority>,
        device: Arc<DeviceRegistry>,
        recovery: Arc<RecoveryCoordinator>,
        schedule: HealthSchedule,
    ) -> Self {
        Self {
            raw,
            authority,
            device,
            recovery,
            schedule,
            worker: Mutex::new(ResourceHealth::Unknown),
            subscription: Mutex::new(ResourceHealth::Unknown),
            cancel: Mutex::new(None),
        }
    }

    /// Health of the service worker as of the last check.
    pub fn worker_health(&self) -> ResourceHealth {
        *lock(&self.worker)
    }

    /// Health of the push subscription as of the last check.
    pub fn subscription_health(&self) -> ResourceHealth {
        *lock(&self.subscription)
    }

    /// Check the service worker and the subscription once.
    ///
    /// Subscription problems only count while the user wants a subscription.
    /// A missing one additionally needs permission to be granted; without it
    /// there is nothing recovery could repair.
    pub async fn check_liveness(&self) -> HealthSnapshot {
        let worker = match self.raw.worker_registration().await {
            Ok(Some(registration)) if registration.is_active() => None,
            Ok(Some(_)) => Some(UnhealthyReason::WorkerNotActive),
            Ok(None) => Some(UnhealthyReason::NoServiceWorker),
            Err(e) => Some(UnhealthyReason::CheckFailed(e.to_string())),
        };
        *lock(&self.worker) = if worker.is_some() {
            ResourceHealth::Unhealthy
        } else {
            ResourceHealth::Healthy
        };

        let now = Utc::now();
        let wanted = self.raw.wants_subscription();
        let subscription = match self.raw.current_subscription().await {
            Ok(Some(sub)) if sub.is_expired(now) => wanted.then_some(UnhealthyReason::Expired),
            Ok(Some(sub)) => {
                if sub.expires_within(now, constants::EXPIRY_WARNING_WINDOW) {
                    log::warn!(
                        "[Health] Subscription expires soon ({:?})",
                        sub.expiration_time
                    );
                }
                None
            }
            Ok(None) if wanted && self.raw.permission_state().is_granted() => {
                Some(UnhealthyReason::NoSubscription)
            }
            Ok(None) => None,
            Err(e) => Some(UnhealthyReason::CheckFailed(e.to_string())),
        };
        *lock(&self.subscription) = if subscription.is_some() {
            ResourceHealth::Unhealthy
        } else {
            ResourceHealth::Healthy
        };

        match worker.or(subscription) {
            Some(reason) => {
                log::warn!("[Health] Unhealthy: {reason}");
                HealthSnapshot::unhealthy(reason)
            }
            None => {
                log::debug!("[Health] Healthy");
                HealthSnapshot::healthy()
            }
        }
    }

    /// Send one heartbeat. Returns whether the authority acknowledged it.
    pub async fn heartbeat(&self) -> bool {
        let subscription = self.raw.current_subscription().await.ok().flatten();
        let now = Utc::now();
        let request = HeartbeatRequest {
            device_id: self.device.get_device_id(),
            endpoint: subscription.as_ref().map(|s| s.endpoint.clone()),
            device_info: self.device.fingerprint(),
            timestamp: now,
            subscription_valid: subscription.is_some_and(|s| !s.is_expired(now)),
        };
        match self.authority.heartbeat(&request).await {
            Ok(_) => {
                log::debug!("[Health] Heartbeat acknowledged");
                true
            }
            Err(e) => {
                log::warn!("[Health] Heartbeat failed: {e}");
                false
            }
        }
    }

    /// Run one liveness check and spawn recovery on failure.
    pub async fn tick(&self) -> HealthSnapshot {
        let snapshot = self.check_liveness().await;
        if !snapshot.healthy {
            if self.recovery.is_running() {
                log::debug!("[Health] Recovery already running");
            } else {
                let recovery = Arc::clone(&self.recovery);
                tokio::spawn(async move {
                    recovery.recover().await;
                });
            }
        }
        snapshot
    }

    /// Start both loops, replacing any running pair.
    pub fn start(self: &Arc<Self>) {
        self.stop();
        let token = CancellationToken::new();
        *lock(&self.cancel) = Some(token.clone());

        let monitor = Arc::clone(self);
        let cancel = token.clone();
        tokio::spawn(async move {
            let period = monitor.schedule.check_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if monitor.raw.state().supported {
                            monitor.tick().await;
                        }
                    }
                }
            }
            log::debug!("[Health] Liveness loop stopped");
        });

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(monitor.schedule.initial_heartbeat_delay) => {}
            }
            monitor.heartbeat().await;

            let period = monitor.schedule.heartbeat_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.heartbeat().await;
                    }
                }
            }
            log::debug!("[Health] Heartbeat loop stopped");
        });

        log::info!(
            "[Health] Monitoring started (check every {}s, heartbeat every {}s)",
            self.schedule.check_interval.as_secs(),
            self.schedule.heartbeat_interval.as_secs()
        );
    }

    /// Stop both loops. No-op when stopped.
    pub fn stop(&self) {
        if let Some(token) = lock(&self.cancel).take() {
            token.cancel();
            log::info!("[Health] Monitoring stopped");
        }
    }

    /// Whether the loops are running.
    pub fn is_running(&self) -> bool {
        lock(&self.cancel)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}
