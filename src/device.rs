//! Device identity for push registration.
//!
//! This module handles:
//! - Fingerprint collection (browser or host attributes)
//! - Stable device id derivation and persistence
//!
//! The id is created once per storage profile and never regenerated while the
//! stored value survives. Clearing storage yields a fresh, different id.

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::constants::DEVICE_ID_STORAGE_KEY;
use crate::storage::KeyValueStore;

/// Hardware/software attributes describing the device.
///
/// Serialized in camelCase because the authority stores it verbatim as
/// `device_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFingerprint {
    /// User agent string.
    pub user_agent: String,
    /// Platform name (e.g. "MacIntel", "linux").
    pub platform: String,
    /// Preferred language tag.
    pub language: String,
    /// Screen resolution as `WxH`.
    pub screen_resolution: String,
    /// Color depth in bits.
    pub color_depth: u32,
    /// IANA timezone name.
    pub timezone: String,
    /// Offset from UTC in minutes, positive west of UTC.
    pub timezone_offset: i32,
    /// Logical CPU count.
    pub hardware_concurrency: u32,
    /// Approximate device memory in GiB, when exposed.
    pub device_memory: Option<f64>,
    /// Maximum simultaneous touch points.
    pub max_touch_points: u32,
}

impl DeviceFingerprint {
    /// Placeholder used when the fingerprint cannot be collected.
    pub fn unknown() -> Self {
        Self {
            user_agent: "unknown".to_string(),
            platform: "unknown".to_string(),
            language: "unknown".to_string(),
            screen_resolution: "0x0".to_string(),
            color_depth: 0,
            timezone: "UTC".to_string(),
            timezone_offset: 0,
            hardware_concurrency: 0,
            device_memory: None,
            max_touch_points: 0,
        }
    }
}

/// A resolved device id together with the fingerprint it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable device identifier.
    pub id: String,
    /// Fingerprint snapshot.
    pub fingerprint: DeviceFingerprint,
}

/// Collects a device fingerprint from the hosting environment.
pub trait FingerprintSource: Send + Sync {
    /// Collect the current fingerprint.
    fn collect(&self) -> Result<DeviceFingerprint>;
}

/// Fingerprint of the native host process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFingerprint;

impl FingerprintSource for NativeFingerprint {
    fn collect(&self) -> Result<DeviceFingerprint> {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(|l| l.replace('_', "-")))
            .filter(|l| !l.is_empty() && l != "C" && l != "POSIX")
            .unwrap_or_else(|| "en-US".to_string());

        let offset_secs = chrono::Local::now().offset().local_minus_utc();
        let hardware_concurrency = std::thread::available_parallelism()
            .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
            .unwrap_or(1);

        Ok(DeviceFingerprint {
            user_agent: format!(
                "push_lifecycle/{} ({}; {}; {})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH,
                host
            ),
            platform: std::env::consts::OS.to_string(),
            language,
            screen_resolution: "0x0".to_string(),
            color_depth: 0,
            timezone: std::env::var("TZ").unwrap_or_else(|_| "Local".to_string()),
            timezone_offset: -(offset_secs / 60),
            hardware_concurrency,
            device_memory: None,
            max_touch_points: 0,
        })
    }
}

/// Resolves and caches the device id.
///
/// Built once per session and shared by reference; the first call to
/// [`DeviceRegistry::get_device_id`] creates and persists the id.
pub struct DeviceRegistry {
    store: Arc<dyn KeyValueStore>,
    source: Box<dyn FingerprintSource>,
    cached: Mutex<Option<String>>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// Create a registry over the given store and fingerprint source.
    pub fn new(store: Arc<dyn KeyValueStore>, source: Box<dyn FingerprintSource>) -> Self {
        Self {
            store,
            source,
            cached: Mutex::new(None),
        }
    }

    /// Return the device id, creating and persisting it on first use.
    ///
    /// Never fails. A fingerprint error falls back to a random id; a storage
    /// error is logged and the id is kept in memory for this session.
    pub fn get_device_id(&self) -> String {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        match self.store.get(DEVICE_ID_STORAGE_KEY) {
            Ok(Some(id)) if !id.is_empty() => {
                log::debug!("[Device] Loaded device id from storage");
                *cached = Some(id.clone());
                return id;
            }
            Ok(_) => {}
            Err(e) => log::warn!("[Device] Failed to read device id: {e}"),
        }

        let id = match self.source.collect() {
            Ok(fingerprint) => derive_device_id(&fingerprint),
            Err(e) => {
                log::warn!("[Device] Fingerprinting failed, using random id: {e}");
                random_device_id()
            }
        };

        if let Err(e) = self.store.set(DEVICE_ID_STORAGE_KEY, &id) {
            log::warn!("[Device] Failed to persist device id: {e}");
        }
        log::info!("[Device] Created device id {id}");

        *cached = Some(id.clone());
        id
    }

    /// Current fingerprint snapshot, or [`DeviceFingerprint::unknown`] on error.
    pub fn fingerprint(&self) -> DeviceFingerprint {
        self.source.collect().unwrap_or_else(|e| {
            log::debug!("[Device] Fingerprint unavailable: {e}");
            DeviceFingerprint::unknown()
        })
    }

    /// Id and fingerprint together.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            id: self.get_device_id(),
            fingerprint: self.fingerprint(),
        }
    }

    /// Drop the cached and stored id. The next call creates a new one.
    pub fn forget(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
        if let Err(e) = self.store.remove(DEVICE_ID_STORAGE_KEY) {
            log::warn!("[Device] Failed to remove device id: {e}");
        }
    }
}

/// 32-bit rolling hash (`h * 31 + unit`, wrapping) over UTF-16 code units.
pub fn rolling_hash(input: &str) -> i32 {
    input.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

fn derive_device_id(fingerprint: &DeviceFingerprint) -> String {
    let serialized = match serde_json::to_string(fingerprint) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("[Device] Failed to serialize fingerprint: {e}");
            return random_device_id();
        }
    };
    let hash = rolling_hash(&serialized);
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    let salt: u32 = rand::rng().random();

    format!(
        "device_{}_{}_{}",
        to_base36(u64::from(hash.unsigned_abs())),
        to_base36(millis),
        to_base36(u64::from(salt))
    )
}

fn random_device_id() -> String {
    format!("device_{}", uuid::Uuid::new_v4().simple())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
