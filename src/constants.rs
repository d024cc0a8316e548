//! Crate-wide constants for the push lifecycle engine.
//!
//! Centralizes intervals, timeouts and storage keys so the defaults used by
//! [`crate::config::Config`] and the monitoring loops live in one place.
//!
//! # Categories
//!
//! - **Timeouts**: authority requests and SDK script loading
//! - **Monitoring**: liveness check and heartbeat cadence
//! - **Storage**: durable local keys
//! - **Platform**: service worker and SDK locations

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Per-request timeout for authority calls.
///
/// Applies to every HTTP request, including those made from the health,
/// heartbeat and recovery paths.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a caller waits for the SDK global to appear after the script tag
/// has been injected.
pub const SDK_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll cadence while waiting for the SDK global to become available.
pub const SDK_AVAILABILITY_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Monitoring
// ============================================================================

/// Interval between liveness checks of the service worker and subscription.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(120);

/// Interval between heartbeats to the authority.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

/// Delay before the first heartbeat after monitoring starts.
///
/// Fires well ahead of the first interval tick so a dead subscription is
/// noticed soon after a fresh page load.
pub const INITIAL_HEARTBEAT_DELAY: Duration = Duration::from_secs(5);

/// A subscription expiring within this window is logged as a warning.
pub const EXPIRY_WARNING_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// Storage
// ============================================================================

/// Durable storage key holding the device identifier.
pub const DEVICE_ID_STORAGE_KEY: &str = "push_device_id";

/// Durable storage key holding the bearer token for the authority.
pub const AUTH_TOKEN_STORAGE_KEY: &str = "auth_token";

// ============================================================================
// Platform
// ============================================================================

/// Script URL of the push service worker.
pub const SERVICE_WORKER_PATH: &str = "/push-sw.js";

/// Scope the push service worker is registered under.
pub const SERVICE_WORKER_SCOPE: &str = "/";

/// Default location of the third-party push SDK script.
pub const SDK_SCRIPT_URL: &str = "https://cdn.onesignal.com/sdks/web/v16/OneSignalSDK.page.js";

/// Default authority base URL.
pub const DEFAULT_AUTHORITY_URL: &str = "http://localhost:8000/api/notifications";
